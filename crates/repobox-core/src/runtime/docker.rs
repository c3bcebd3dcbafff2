//! `SandboxRuntime` adapter over the `docker` CLI.

use super::{shell_quote, ExecOutput, ExecSpec, SandboxHandle, SandboxState, StartSpec};
use crate::error::Error;
use crate::Result;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Grace period past the command deadline before the client-side
/// `docker exec` process itself is killed.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// Drives a local Docker (or Docker-compatible) engine through its CLI.
///
/// Commands are dispatched with `docker exec`, wrapped in `timeout -k`
/// inside the sandbox so the whole process group dies at the deadline;
/// a client-side timeout backstops an unresponsive engine.
pub struct DockerRuntime {
    binary: String,
    max_output_bytes: usize,
}

impl Default for DockerRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerRuntime {
    pub fn new() -> Self {
        Self {
            binary: "docker".to_string(),
            max_output_bytes: 16 * 1024 * 1024,
        }
    }

    /// Use a different engine binary (e.g. `podman`).
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Cap captured stdout/stderr per command.
    pub fn with_max_output_bytes(mut self, bytes: usize) -> Self {
        self.max_output_bytes = bytes;
        self
    }

    /// Run a short engine command to completion.
    async fn engine(&self, args: &[String]) -> Result<std::process::Output> {
        debug!("docker {}", args.join(" "));
        Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::Infrastructure(format!("failed to invoke {}: {e}", self.binary)))
    }

    fn cap(&self, bytes: Vec<u8>) -> String {
        let mut text = String::from_utf8_lossy(&bytes).into_owned();
        if text.len() > self.max_output_bytes {
            // The cut may land inside a multi-byte character; back up to
            // the nearest boundary so truncate cannot panic.
            let mut cut = self.max_output_bytes;
            while !text.is_char_boundary(cut) {
                cut -= 1;
            }
            text.truncate(cut);
            text.push_str("\n[output truncated]");
        }
        text
    }
}

#[async_trait]
impl super::SandboxRuntime for DockerRuntime {
    async fn ping(&self) -> Result<()> {
        let args = vec![
            "version".to_string(),
            "--format".to_string(),
            "{{.Server.Version}}".to_string(),
        ];
        let out = self.engine(&args).await?;
        if out.status.success() {
            Ok(())
        } else {
            Err(Error::Infrastructure(format!(
                "docker daemon unreachable: {}",
                String::from_utf8_lossy(&out.stderr).trim()
            )))
        }
    }

    async fn start(&self, spec: StartSpec) -> Result<SandboxHandle> {
        let args = start_args(&spec);
        let out = self.engine(&args).await?;
        if !out.status.success() {
            return Err(Error::Infrastructure(format!(
                "failed to start sandbox {}: {}",
                spec.name,
                String::from_utf8_lossy(&out.stderr).trim()
            )));
        }
        Ok(SandboxHandle::new(spec.name))
    }

    async fn exec(&self, handle: &SandboxHandle, spec: ExecSpec) -> Result<ExecOutput> {
        let secs = spec.timeout.as_secs().max(1);
        // In-container wrapper kills the command and its children at the
        // deadline; coreutils timeout exits 124 (SIGTERM) or 137 (SIGKILL).
        let wrapped = format!(
            "timeout -k 2 {} bash -c {}",
            secs,
            shell_quote(&spec.command)
        );
        let args = vec![
            "exec".to_string(),
            "-w".to_string(),
            spec.working_dir.clone(),
            handle.name().to_string(),
            "bash".to_string(),
            "-c".to_string(),
            wrapped,
        ];
        debug!("docker exec in {}: {}", handle.name(), spec.command);

        let child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Infrastructure(format!("failed to invoke {}: {e}", self.binary)))?;

        let deadline = spec.timeout + KILL_GRACE;
        let out = match tokio::time::timeout(deadline, child.wait_with_output()).await {
            Ok(Ok(out)) => out,
            Ok(Err(e)) => {
                return Err(Error::Infrastructure(format!("docker exec failed: {e}")));
            }
            // Engine did not honor the in-container deadline; the dropped
            // child kills the client process.
            Err(_) => {
                warn!(
                    "docker exec against {} exceeded {}s client deadline",
                    handle.name(),
                    deadline.as_secs()
                );
                return Ok(ExecOutput {
                    exit_code: -1,
                    stdout: String::new(),
                    stderr: format!("command killed after {secs}s timeout"),
                    timed_out: true,
                });
            }
        };

        let exit_code = out.status.code().map(i64::from).unwrap_or(-1);
        Ok(ExecOutput {
            exit_code,
            stdout: self.cap(out.stdout),
            stderr: self.cap(out.stderr),
            timed_out: is_timeout_exit(exit_code),
        })
    }

    async fn inspect(&self, handle: &SandboxHandle) -> Result<SandboxState> {
        let args = vec![
            "inspect".to_string(),
            "-f".to_string(),
            "{{.State.Status}}".to_string(),
            handle.name().to_string(),
        ];
        let out = self.engine(&args).await?;
        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            if stderr.contains("No such") {
                return Ok(SandboxState::Missing);
            }
            return Err(Error::Infrastructure(format!(
                "docker inspect failed: {}",
                stderr.trim()
            )));
        }
        match String::from_utf8_lossy(&out.stdout).trim() {
            "running" => Ok(SandboxState::Running),
            _ => Ok(SandboxState::Exited),
        }
    }

    async fn destroy(&self, handle: &SandboxHandle) -> Result<()> {
        let args = vec![
            "rm".to_string(),
            "-f".to_string(),
            handle.name().to_string(),
        ];
        let out = self.engine(&args).await?;
        if out.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&out.stderr);
        // Already gone counts as destroyed
        if stderr.contains("No such container") {
            return Ok(());
        }
        Err(Error::Infrastructure(format!(
            "failed to destroy {}: {}",
            handle.name(),
            stderr.trim()
        )))
    }
}

/// Build the `docker run` argument list for a start spec.
fn start_args(spec: &StartSpec) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "-d".to_string(),
        "--name".to_string(),
        spec.name.clone(),
        "--workdir".to_string(),
        spec.working_dir.clone(),
        "--network".to_string(),
        spec.network.clone(),
    ];
    if let Some(mem) = &spec.memory_limit {
        args.push("--memory".to_string());
        args.push(mem.clone());
    }
    if let Some(cpus) = spec.cpu_limit {
        args.push("--cpus".to_string());
        args.push(cpus.to_string());
    }
    if let Some(pids) = spec.pids_limit {
        args.push("--pids-limit".to_string());
        args.push(pids.to_string());
    }
    let mut env: Vec<_> = spec.env.iter().collect();
    env.sort();
    for (key, value) in env {
        args.push("--env".to_string());
        args.push(format!("{key}={value}"));
    }
    args.push(spec.image.clone());
    args.push("bash".to_string());
    args.push("-c".to_string());
    // Keep the sandbox alive until destroyed
    args.push("sleep infinity".to_string());
    args
}

/// Exit codes coreutils `timeout` reports when it killed the command.
fn is_timeout_exit(code: i64) -> bool {
    code == 124 || code == 137
}
