//! Command-line surface for the repobox service.

use anyhow::Context;
use clap::Parser;
use repobox_core::runtime::DockerRuntime;
use repobox_core::{ContainerService, SandboxRuntime, Settings};
use repobox_gateway::GatewayConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Sandbox service for short-lived repository containers.
#[derive(Debug, Parser)]
#[command(name = "repobox", version, about)]
pub struct Cli {
    /// Address to bind the HTTP gateway to.
    #[arg(long, env = "REPOBOX_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port for the HTTP gateway.
    #[arg(long, env = "REPOBOX_PORT", default_value_t = repobox_gateway::DEFAULT_PORT)]
    pub port: u16,

    /// Container image used for new sandboxes.
    #[arg(long, env = "REPOBOX_BASE_IMAGE")]
    pub base_image: Option<String>,

    /// Seconds between reaper sweeps.
    #[arg(long, env = "REPOBOX_REAP_INTERVAL_SECS")]
    pub reap_interval_secs: Option<u64>,

    /// Docker binary to shell out to.
    #[arg(long, env = "REPOBOX_DOCKER_BINARY", default_value = "docker")]
    pub docker_binary: String,
}

impl Cli {
    fn settings(&self) -> Settings {
        let mut settings = Settings::from_env();
        if let Some(image) = &self.base_image {
            settings.base_image = image.clone();
        }
        if let Some(secs) = self.reap_interval_secs {
            settings.reap_interval = Duration::from_secs(secs.max(1));
        }
        settings
    }
}

/// Wire up the runtime, service, reaper, and gateway, then serve until
/// interrupted.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = cli.settings();
    let runtime = Arc::new(
        DockerRuntime::new()
            .with_binary(&cli.docker_binary)
            .with_max_output_bytes(settings.max_output_bytes),
    );

    runtime
        .ping()
        .await
        .context("container engine is not reachable; is the docker daemon running?")?;
    info!("Container engine reachable via {:?}", cli.docker_binary);

    let service = Arc::new(ContainerService::new(settings, runtime));
    let reaper = service.spawn_reaper();

    let config = GatewayConfig {
        host: cli.host.clone(),
        port: cli.port,
    };
    repobox_gateway::serve(config, service, shutdown_signal())
        .await
        .context("gateway server failed")?;

    // Gateway has drained; tear down every remaining sandbox.
    reaper.shutdown().await;
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {e}");
    } else {
        info!("Shutdown signal received");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["repobox"]);
        assert_eq!(cli.host, "0.0.0.0");
        assert_eq!(cli.port, repobox_gateway::DEFAULT_PORT);
        assert_eq!(cli.docker_binary, "docker");
        assert!(cli.base_image.is_none());
    }

    #[test]
    fn test_cli_overrides_settings() {
        let cli = Cli::parse_from([
            "repobox",
            "--base-image",
            "debian:12",
            "--reap-interval-secs",
            "5",
        ]);
        let settings = cli.settings();
        assert_eq!(settings.base_image, "debian:12");
        assert_eq!(settings.reap_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_reap_interval_floor() {
        let cli = Cli::parse_from(["repobox", "--reap-interval-secs", "0"]);
        assert_eq!(cli.settings().reap_interval, Duration::from_secs(1));
    }
}
