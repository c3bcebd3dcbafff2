//! Service settings with environment-variable overrides.

use std::time::Duration;
use tracing::warn;

/// Tunables for the lifecycle manager.
///
/// Defaults are production-ready; every field can be overridden through a
/// `REPOBOX_*` environment variable via [`Settings::from_env`].
#[derive(Debug, Clone)]
pub struct Settings {
    /// Image used for new sandboxes.
    pub base_image: String,

    /// Directory inside the sandbox where repositories are cloned.
    /// Root for all browse/read path resolution.
    pub workspace_dir: String,

    /// Branch checked out when the caller does not name one.
    pub default_branch: String,

    /// Docker network sandboxes are attached to. Cloning needs egress,
    /// so this is a named network rather than `none`.
    pub network: String,

    /// Memory limit passed to the engine (e.g. `2g`); `None` = engine default.
    pub memory_limit: Option<String>,

    /// CPU limit in cores; `None` = engine default.
    pub cpu_limit: Option<f64>,

    /// Process-count limit inside the sandbox.
    pub pids_limit: Option<u64>,

    /// Deadline for the clone phase of provisioning.
    pub clone_timeout_secs: u64,

    /// Command timeout applied when the caller omits one.
    pub default_exec_timeout_secs: u64,

    /// Upper bound a caller-supplied timeout is clamped to.
    pub max_exec_timeout_secs: u64,

    /// Read ceiling for file content, in bytes.
    pub max_file_bytes: u64,

    /// Cap on captured stdout/stderr per command, in bytes.
    pub max_output_bytes: usize,

    /// Interval between reaper sweeps.
    pub reap_interval: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_image: "ubuntu:22.04".to_string(),
            workspace_dir: "/workspace".to_string(),
            default_branch: "main".to_string(),
            network: "bridge".to_string(),
            memory_limit: Some("2g".to_string()),
            cpu_limit: Some(2.0),
            pids_limit: Some(512),
            clone_timeout_secs: 300,
            default_exec_timeout_secs: 30,
            max_exec_timeout_secs: 300,
            max_file_bytes: 10 * 1024 * 1024,
            max_output_bytes: 16 * 1024 * 1024,
            reap_interval: Duration::from_secs(30),
        }
    }
}

impl Settings {
    /// Build settings from defaults plus `REPOBOX_*` environment overrides.
    pub fn from_env() -> Self {
        let mut settings = Self::default();

        if let Some(v) = env_string("REPOBOX_BASE_IMAGE") {
            settings.base_image = v;
        }
        if let Some(v) = env_string("REPOBOX_WORKSPACE_DIR") {
            settings.workspace_dir = v;
        }
        if let Some(v) = env_string("REPOBOX_DEFAULT_BRANCH") {
            settings.default_branch = v;
        }
        if let Some(v) = env_string("REPOBOX_NETWORK") {
            settings.network = v;
        }
        if let Some(v) = env_string("REPOBOX_MEMORY_LIMIT") {
            settings.memory_limit = (!v.is_empty()).then_some(v);
        }
        if let Some(v) = env_parse::<f64>("REPOBOX_CPU_LIMIT") {
            settings.cpu_limit = Some(v);
        }
        if let Some(v) = env_parse::<u64>("REPOBOX_PIDS_LIMIT") {
            settings.pids_limit = Some(v);
        }
        if let Some(v) = env_parse::<u64>("REPOBOX_CLONE_TIMEOUT_SECS") {
            settings.clone_timeout_secs = v;
        }
        if let Some(v) = env_parse::<u64>("REPOBOX_DEFAULT_EXEC_TIMEOUT_SECS") {
            settings.default_exec_timeout_secs = v;
        }
        if let Some(v) = env_parse::<u64>("REPOBOX_MAX_EXEC_TIMEOUT_SECS") {
            // Floor of 1: the executor clamps requested timeouts to 1..=max
            settings.max_exec_timeout_secs = v.max(1);
        }
        if let Some(v) = env_parse::<u64>("REPOBOX_MAX_FILE_BYTES") {
            settings.max_file_bytes = v;
        }
        if let Some(v) = env_parse::<usize>("REPOBOX_MAX_OUTPUT_BYTES") {
            settings.max_output_bytes = v;
        }
        if let Some(v) = env_parse::<u64>("REPOBOX_REAP_INTERVAL_SECS") {
            settings.reap_interval = Duration::from_secs(v.max(1));
        }

        settings
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = env_string(key)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("Ignoring unparsable {}={:?}", key, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.workspace_dir, "/workspace");
        assert_eq!(s.default_branch, "main");
        assert_eq!(s.default_exec_timeout_secs, 30);
        assert!(s.max_exec_timeout_secs >= s.default_exec_timeout_secs);
    }

    #[test]
    fn test_env_override() {
        // Env mutation is process-global, so keep this to a single test.
        std::env::set_var("REPOBOX_DEFAULT_BRANCH", "trunk");
        std::env::set_var("REPOBOX_REAP_INTERVAL_SECS", "5");
        std::env::set_var("REPOBOX_PIDS_LIMIT", "not-a-number");
        std::env::set_var("REPOBOX_MAX_EXEC_TIMEOUT_SECS", "0");

        let s = Settings::from_env();
        assert_eq!(s.default_branch, "trunk");
        assert_eq!(s.reap_interval, Duration::from_secs(5));
        // Unparsable values fall back to the default
        assert_eq!(s.pids_limit, Settings::default().pids_limit);
        // Zero would make the executor's clamp range empty
        assert_eq!(s.max_exec_timeout_secs, 1);

        std::env::remove_var("REPOBOX_DEFAULT_BRANCH");
        std::env::remove_var("REPOBOX_REAP_INTERVAL_SECS");
        std::env::remove_var("REPOBOX_PIDS_LIMIT");
        std::env::remove_var("REPOBOX_MAX_EXEC_TIMEOUT_SECS");
    }
}
