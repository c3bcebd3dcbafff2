//! Command execution against running sandboxes.

use crate::error::Error;
use crate::registry::Registry;
use crate::runtime::{ExecSpec, SandboxHandle, SandboxRuntime};
use crate::settings::Settings;
use crate::types::{CommandOutcome, ContainerStatus};
use crate::Result;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Predicate deciding whether a command may be dispatched. Injected by
/// the embedding service; absent means allow-all.
pub type CommandPolicy = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Per-sandbox lock table, shared with the reaper so entries are pruned
/// no matter which path removes a sandbox.
pub(crate) type LockMap = Arc<DashMap<String, Arc<tokio::sync::Mutex<()>>>>;

/// Runs commands inside sandboxes under a time bound.
///
/// Calls against different sandboxes proceed fully concurrently; calls
/// against the same sandbox are serialized through a per-sandbox lock,
/// so two commands never interleave on one filesystem.
pub struct Executor {
    registry: Arc<Registry>,
    runtime: Arc<dyn SandboxRuntime>,
    settings: Arc<Settings>,
    locks: LockMap,
    policy: Option<CommandPolicy>,
}

impl Executor {
    pub fn new(
        registry: Arc<Registry>,
        runtime: Arc<dyn SandboxRuntime>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            registry,
            runtime,
            settings,
            locks: Arc::new(DashMap::new()),
            policy: None,
        }
    }

    /// Install a command policy predicate.
    pub fn set_policy(&mut self, policy: CommandPolicy) {
        self.policy = Some(policy);
    }

    /// Execute `command` inside the sandbox identified by `id`.
    ///
    /// The record must exist and be `Running`; nothing is ever dispatched
    /// otherwise. Neither `status` nor `expires_at` is altered. The
    /// outcome is written to the record's `last_command_result`.
    pub async fn execute(
        &self,
        id: &str,
        command: &str,
        working_directory: Option<String>,
        timeout_secs: Option<u64>,
    ) -> Result<CommandOutcome> {
        if let Some(policy) = &self.policy {
            if !policy(command) {
                return Err(Error::Validation(format!(
                    "command rejected by policy: {command}"
                )));
            }
        }

        let record = self.registry.get(id)?;
        if record.status != ContainerStatus::Running {
            return Err(Error::InvalidState {
                id: id.to_string(),
                status: record.status,
            });
        }

        let lock = self.locks.entry(id.to_string()).or_default().clone();
        let _guard = lock.lock().await;

        // Re-check after acquiring the lock: the record may have expired
        // or been deleted while we waited behind another command.
        let record = self.registry.get(id)?;
        if record.status != ContainerStatus::Running {
            return Err(Error::InvalidState {
                id: id.to_string(),
                status: record.status,
            });
        }

        let working_dir = working_directory.unwrap_or_else(|| record.working_directory.clone());
        let timeout = self.clamp_timeout(timeout_secs);
        let outcome = self
            .dispatch(&record.handle, command, &working_dir, timeout)
            .await;

        self.registry.record_command(id, outcome.clone());
        Ok(outcome)
    }

    /// Dispatch a command against a handle directly, bypassing registry
    /// preconditions. Used by `execute` and by the provisioner for the
    /// initial command, which runs before the record is inserted.
    pub(crate) async fn dispatch(
        &self,
        handle: &SandboxHandle,
        command: &str,
        working_dir: &str,
        timeout: Duration,
    ) -> CommandOutcome {
        debug!("Dispatching in {}: {}", handle.name(), command);
        let start = Instant::now();
        let result = self
            .runtime
            .exec(
                handle,
                ExecSpec {
                    command: command.to_string(),
                    working_dir: working_dir.to_string(),
                    timeout,
                },
            )
            .await;
        let elapsed_secs = round3(start.elapsed().as_secs_f64());

        match result {
            Ok(out) => CommandOutcome {
                command: command.to_string(),
                exit_code: out.exit_code,
                stdout: out.stdout,
                stderr: out.stderr,
                elapsed_secs,
                timed_out: out.timed_out,
                timestamp: Utc::now(),
            },
            Err(e) => {
                warn!("Command dispatch in {} failed: {e}", handle.name());
                CommandOutcome {
                    command: command.to_string(),
                    exit_code: -1,
                    stdout: String::new(),
                    stderr: format!("command dispatch failed: {e}"),
                    elapsed_secs,
                    timed_out: false,
                    timestamp: Utc::now(),
                }
            }
        }
    }

    /// Drop the per-sandbox lock entry once a sandbox is gone.
    pub(crate) fn forget(&self, id: &str) {
        self.locks.remove(id);
    }

    /// Handle to the lock table, for the reaper's pruning.
    pub(crate) fn lock_map(&self) -> LockMap {
        self.locks.clone()
    }

    fn clamp_timeout(&self, requested: Option<u64>) -> Duration {
        // max() keeps the range valid even for hand-built settings
        let max = self.settings.max_exec_timeout_secs.max(1);
        let secs = requested
            .unwrap_or(self.settings.default_exec_timeout_secs)
            .clamp(1, max);
        Duration::from_secs(secs)
    }
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}
