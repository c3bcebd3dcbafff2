//! Sandbox provisioning: container start plus repository clone.

use crate::error::Error;
use crate::exec::Executor;
use crate::id;
use crate::registry::Registry;
use crate::runtime::{shell_quote, ExecSpec, SandboxHandle, SandboxRuntime, StartSpec};
use crate::settings::Settings;
use crate::types::{ContainerRecord, ContainerStatus, CreateRequest};
use crate::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Creates sandboxes and registers them.
///
/// Provisioning is two-phase: the slow phase (container start, clone)
/// runs without any registry involvement, and only a fully seeded
/// sandbox is inserted. A failure at any point destroys the partial
/// sandbox; the registry never sees a failed attempt.
pub struct Provisioner {
    registry: Arc<Registry>,
    runtime: Arc<dyn SandboxRuntime>,
    settings: Arc<Settings>,
}

impl Provisioner {
    pub fn new(
        registry: Arc<Registry>,
        runtime: Arc<dyn SandboxRuntime>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            registry,
            runtime,
            settings,
        }
    }

    /// Create a sandbox seeded with the requested repository.
    pub async fn create(&self, req: CreateRequest, executor: &Executor) -> Result<ContainerRecord> {
        validate_repo_url(&req.repo_url)?;
        if req.max_runtime_secs == Some(0) {
            return Err(Error::Validation(
                "max_runtime_secs must be greater than zero".into(),
            ));
        }

        let requested_branch = req
            .branch
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty());
        let branch = requested_branch
            .unwrap_or(&self.settings.default_branch)
            .to_string();
        let commit = req.commit.as_deref().map(str::trim).filter(|c| !c.is_empty());

        let sandbox_id = id::container_id();
        let working_dir = self.settings.workspace_dir.clone();

        // Provenance env, same names the container's tooling can rely on
        let mut env = req.environment_vars.clone();
        env.insert("REPO_URL".to_string(), req.repo_url.clone());
        env.insert("REPO_BRANCH".to_string(), branch.clone());
        env.insert("WORKING_DIR".to_string(), working_dir.clone());
        if let Some(commit) = commit {
            env.insert("REPO_COMMIT".to_string(), commit.to_string());
        }

        // Phase 1: start and seed the sandbox. No lock is held here; the
        // registry is only touched once the sandbox is fully usable.
        let handle = self
            .runtime
            .start(StartSpec {
                name: sandbox_id.clone(),
                image: self.settings.base_image.clone(),
                env: env.clone(),
                working_dir: working_dir.clone(),
                network: self.settings.network.clone(),
                memory_limit: self.settings.memory_limit.clone(),
                cpu_limit: self.settings.cpu_limit,
                pids_limit: self.settings.pids_limit,
            })
            .await?;

        if let Err(e) = self.clone_into(&handle, &req.repo_url, requested_branch, commit).await {
            self.rollback(&handle).await;
            return Err(e);
        }

        let created_at = Utc::now();
        let expires_at = req
            .max_runtime_secs
            .map(|secs| created_at + chrono::Duration::seconds(secs as i64));

        let mut record = ContainerRecord {
            id: sandbox_id.clone(),
            handle: handle.clone(),
            status: ContainerStatus::Running,
            repo_url: req.repo_url.clone(),
            branch,
            commit: commit.map(str::to_string),
            created_at,
            expires_at,
            working_directory: working_dir.clone(),
            environment_vars: env,
            last_command_result: None,
        };

        // Phase 2: optional initial command. Recorded for observability,
        // but its failure never fails the create call.
        if let Some(initial) = req.initial_command.as_deref().filter(|c| !c.trim().is_empty()) {
            let timeout = Duration::from_secs(self.settings.default_exec_timeout_secs);
            let outcome = executor.dispatch(&handle, initial, &working_dir, timeout).await;
            if outcome.exit_code != 0 {
                warn!(
                    "Initial command in {sandbox_id} exited with {}",
                    outcome.exit_code
                );
            }
            record.last_command_result = Some(outcome);
        }

        if let Err(e) = self.registry.insert(record.clone()) {
            self.rollback(&handle).await;
            return Err(e);
        }

        info!(
            "Provisioned {sandbox_id} from {} (branch {}, expires {:?})",
            record.repo_url, record.branch, record.expires_at
        );
        Ok(record)
    }

    /// Run the clone script and verify it succeeded.
    async fn clone_into(
        &self,
        handle: &SandboxHandle,
        repo_url: &str,
        branch: Option<&str>,
        commit: Option<&str>,
    ) -> Result<()> {
        let script = clone_script(repo_url, branch, commit, &self.settings.default_branch);
        let out = self
            .runtime
            .exec(
                handle,
                ExecSpec {
                    command: script,
                    working_dir: self.settings.workspace_dir.clone(),
                    timeout: Duration::from_secs(self.settings.clone_timeout_secs),
                },
            )
            .await?;

        if out.timed_out {
            return Err(Error::Provision(format!(
                "clone of {repo_url} timed out after {}s",
                self.settings.clone_timeout_secs
            )));
        }
        if out.exit_code != 0 {
            return Err(Error::Provision(format!(
                "clone of {repo_url} failed with exit {}: {}",
                out.exit_code,
                tail(&out.stderr, 2000)
            )));
        }
        Ok(())
    }

    /// Best-effort destruction of a partially provisioned sandbox.
    async fn rollback(&self, handle: &SandboxHandle) {
        if let Err(e) = self.runtime.destroy(handle).await {
            // Nothing references this sandbox anymore; the leak is logged
            warn!(
                "Failed to destroy partially provisioned sandbox {}: {e}",
                handle.name()
            );
        }
    }
}

/// Reject anything that is not a well-formed http(s) repository URL.
fn validate_repo_url(raw: &str) -> Result<()> {
    let parsed = url::Url::parse(raw)
        .map_err(|e| Error::Validation(format!("invalid repository URL {raw:?}: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::Validation(format!(
            "unsupported URL scheme {:?}, expected http or https",
            parsed.scheme()
        )));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(Error::Validation(format!(
            "repository URL {raw:?} has no host"
        )));
    }
    Ok(())
}

/// Build the in-sandbox clone script.
///
/// An explicitly requested branch or commit must exist; a bad ref fails
/// the script and with it the whole provisioning attempt. When neither
/// is given, the conventional primary branches are tried in order and
/// the clone's own default is kept as a last resort.
fn clone_script(
    repo_url: &str,
    branch: Option<&str>,
    commit: Option<&str>,
    default_branch: &str,
) -> String {
    let mut lines = vec![
        "set -e".to_string(),
        format!("git clone {} .", shell_quote(repo_url)),
    ];
    match (commit, branch) {
        (Some(commit), _) => {
            lines.push(format!("git checkout {}", shell_quote(commit)));
        }
        (None, Some(branch)) => {
            lines.push(format!("git checkout {}", shell_quote(branch)));
        }
        (None, None) => {
            lines.push(format!(
                "git checkout {} 2>/dev/null || git checkout master 2>/dev/null || true",
                shell_quote(default_branch)
            ));
        }
    }
    lines.join("\n")
}

fn tail(s: &str, max: usize) -> &str {
    match s.char_indices().nth_back(max.saturating_sub(1)) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MemoryRuntime;

    struct Fixture {
        registry: Arc<Registry>,
        runtime: Arc<MemoryRuntime>,
        provisioner: Provisioner,
        executor: Executor,
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(Registry::new());
        let runtime = Arc::new(MemoryRuntime::new());
        let settings = Arc::new(Settings::default());
        Fixture {
            provisioner: Provisioner::new(registry.clone(), runtime.clone(), settings.clone()),
            executor: Executor::new(registry.clone(), runtime.clone(), settings),
            registry,
            runtime,
        }
    }

    fn request(repo_url: &str) -> CreateRequest {
        CreateRequest {
            repo_url: repo_url.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_malformed_url_has_no_side_effects() {
        let f = fixture();
        for bad in ["not a url", "ftp://example.com/repo", "https://", ""] {
            let err = f
                .provisioner
                .create(request(bad), &f.executor)
                .await
                .unwrap_err();
            assert!(matches!(err, Error::Validation(_)), "url {bad:?}");
        }
        assert!(f.registry.is_empty());
        assert_eq!(f.runtime.alive(), 0);
        assert_eq!(f.runtime.exec_count(), 0);
    }

    #[tokio::test]
    async fn test_zero_runtime_is_rejected() {
        let f = fixture();
        let mut req = request("https://example.com/org/repo");
        req.max_runtime_secs = Some(0);
        let err = f.provisioner.create(req, &f.executor).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(f.registry.is_empty());
    }

    #[tokio::test]
    async fn test_create_registers_running_record() {
        let f = fixture();
        let record = f
            .provisioner
            .create(request("https://example.com/org/repo"), &f.executor)
            .await
            .unwrap();

        assert_eq!(record.status, ContainerStatus::Running);
        assert_eq!(record.branch, "main");
        assert!(record.commit.is_none());
        assert!(record.expires_at.is_none());
        assert_eq!(record.working_directory, "/workspace");
        assert_eq!(record.environment_vars["REPO_URL"], "https://example.com/org/repo");

        assert_eq!(f.registry.len(), 1);
        assert_eq!(f.runtime.alive(), 1);
    }

    #[tokio::test]
    async fn test_expiry_strictly_after_creation() {
        let f = fixture();
        let mut req = request("https://example.com/org/repo");
        req.max_runtime_secs = Some(120);
        let record = f.provisioner.create(req, &f.executor).await.unwrap();
        assert!(record.expires_at.unwrap() > record.created_at);
    }

    #[tokio::test]
    async fn test_requested_branch_is_kept() {
        let f = fixture();
        let mut req = request("https://example.com/org/repo");
        req.branch = Some("develop".to_string());
        let record = f.provisioner.create(req, &f.executor).await.unwrap();
        assert_eq!(record.branch, "develop");
        assert!(record.commit.is_none());
    }

    #[tokio::test]
    async fn test_clone_failure_rolls_back() {
        let f = fixture();
        f.runtime.script_exec(|_, spec| {
            if spec.command.contains("git clone") {
                MemoryRuntime::failed_output(128, "fatal: repository not found")
            } else {
                MemoryRuntime::ok_output("")
            }
        });

        let err = f
            .provisioner
            .create(request("https://example.com/org/missing"), &f.executor)
            .await
            .unwrap_err();
        match err {
            Error::Provision(msg) => assert!(msg.contains("fatal: repository not found")),
            other => panic!("expected Provision error, got {other:?}"),
        }

        // No registry entry, and the partial sandbox was destroyed
        assert!(f.registry.is_empty());
        assert_eq!(f.runtime.alive(), 0);
        assert_eq!(f.runtime.destroyed().len(), 1);
    }

    #[tokio::test]
    async fn test_start_failure_leaves_registry_unchanged() {
        let f = fixture();
        f.runtime.set_fail_start(true);
        let err = f
            .provisioner
            .create(request("https://example.com/org/repo"), &f.executor)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Infrastructure(_)));
        assert!(f.registry.is_empty());
    }

    #[tokio::test]
    async fn test_initial_command_failure_does_not_fail_create() {
        let f = fixture();
        f.runtime.script_exec(|_, spec| {
            if spec.command.contains("git clone") {
                MemoryRuntime::ok_output("")
            } else {
                MemoryRuntime::failed_output(2, "make: *** no rule")
            }
        });

        let mut req = request("https://example.com/org/repo");
        req.initial_command = Some("make build".to_string());
        let record = f.provisioner.create(req, &f.executor).await.unwrap();

        assert_eq!(record.status, ContainerStatus::Running);
        let last = record.last_command_result.unwrap();
        assert_eq!(last.command, "make build");
        assert_eq!(last.exit_code, 2);
    }

    #[test]
    fn test_url_validation() {
        assert!(validate_repo_url("https://example.com/org/repo").is_ok());
        assert!(validate_repo_url("http://example.com/org/repo.git").is_ok());
        assert!(validate_repo_url("git@example.com:org/repo.git").is_err());
        assert!(validate_repo_url("file:///etc/passwd").is_err());
        assert!(validate_repo_url("https://").is_err());
        // The url crate folds an empty authority away: https:///x == https://x
        assert!(validate_repo_url("https:///no-host").is_ok());
    }

    #[test]
    fn test_clone_script_commit_wins() {
        let script = clone_script(
            "https://example.com/r",
            Some("develop"),
            Some("abc123"),
            "main",
        );
        assert!(script.contains("git checkout 'abc123'"));
        assert!(!script.contains("'develop'"));
    }

    #[test]
    fn test_clone_script_explicit_branch_has_no_fallback() {
        let script = clone_script("https://example.com/r", Some("develop"), None, "main");
        assert!(script.contains("git checkout 'develop'"));
        assert!(!script.contains("||"));
    }

    #[test]
    fn test_clone_script_default_branch_falls_back() {
        let script = clone_script("https://example.com/r", None, None, "main");
        assert!(script.starts_with("set -e"));
        assert!(script.contains("git checkout 'main' 2>/dev/null || git checkout master"));
        assert!(script.ends_with("|| true"));
    }

    #[test]
    fn test_clone_script_quotes_url() {
        let script = clone_script("https://example.com/r'; rm -rf /", None, None, "main");
        assert!(script.contains("git clone 'https://example.com/r'\\''; rm -rf /' ."));
    }
}
