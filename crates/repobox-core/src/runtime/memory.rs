//! In-memory `SandboxRuntime` for tests and offline development.

use super::{ExecOutput, ExecSpec, SandboxHandle, SandboxState, StartSpec};
use crate::error::Error;
use crate::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

type ExecScript = Box<dyn Fn(&str, &ExecSpec) -> ExecOutput + Send + Sync>;

/// Scriptable in-memory engine.
///
/// Sandboxes are just names in a set; command behavior is controlled by
/// an optional script closure, an artificial delay, and failure toggles.
/// Lifecycle and expiration logic can be exercised against it without a
/// real container engine.
#[derive(Default)]
pub struct MemoryRuntime {
    sandboxes: Mutex<HashSet<String>>,
    destroyed: Mutex<Vec<String>>,
    script: Mutex<Option<ExecScript>>,
    exec_delay: Mutex<Option<Duration>>,
    exec_count: AtomicU64,
    fail_start: AtomicBool,
    fail_destroy: AtomicBool,
    fail_ping: AtomicBool,
}

impl MemoryRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provide the output every exec call returns. The closure receives
    /// the sandbox name and the exec spec.
    pub fn script_exec<F>(&self, f: F)
    where
        F: Fn(&str, &ExecSpec) -> ExecOutput + Send + Sync + 'static,
    {
        *self.script.lock() = Some(Box::new(f));
    }

    /// Make every exec take this long. Delays at or past the spec's
    /// timeout produce a timed-out outcome, like a real engine would.
    pub fn set_exec_delay(&self, delay: Duration) {
        *self.exec_delay.lock() = Some(delay);
    }

    /// Make subsequent `start` calls fail.
    pub fn set_fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `destroy` calls fail.
    pub fn set_fail_destroy(&self, fail: bool) {
        self.fail_destroy.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `ping` calls fail.
    pub fn set_fail_ping(&self, fail: bool) {
        self.fail_ping.store(fail, Ordering::SeqCst);
    }

    /// Names of sandboxes destroyed so far, in order.
    pub fn destroyed(&self) -> Vec<String> {
        self.destroyed.lock().clone()
    }

    /// Number of sandboxes currently alive.
    pub fn alive(&self) -> usize {
        self.sandboxes.lock().len()
    }

    /// Total exec dispatches that reached the engine.
    pub fn exec_count(&self) -> u64 {
        self.exec_count.load(Ordering::SeqCst)
    }

    /// Convenience: a successful output with the given stdout.
    pub fn ok_output(stdout: impl Into<String>) -> ExecOutput {
        ExecOutput {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
            timed_out: false,
        }
    }

    /// Convenience: a failed output with the given exit code and stderr.
    pub fn failed_output(exit_code: i64, stderr: impl Into<String>) -> ExecOutput {
        ExecOutput {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
            timed_out: false,
        }
    }
}

#[async_trait]
impl super::SandboxRuntime for MemoryRuntime {
    async fn ping(&self) -> Result<()> {
        if self.fail_ping.load(Ordering::SeqCst) {
            return Err(Error::Infrastructure("simulated engine outage".into()));
        }
        Ok(())
    }

    async fn start(&self, spec: StartSpec) -> Result<SandboxHandle> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(Error::Infrastructure("simulated start failure".into()));
        }
        let mut sandboxes = self.sandboxes.lock();
        if !sandboxes.insert(spec.name.clone()) {
            return Err(Error::Infrastructure(format!(
                "sandbox name already in use: {}",
                spec.name
            )));
        }
        Ok(SandboxHandle::new(spec.name))
    }

    async fn exec(&self, handle: &SandboxHandle, spec: ExecSpec) -> Result<ExecOutput> {
        if !self.sandboxes.lock().contains(handle.name()) {
            return Err(Error::Infrastructure(format!(
                "no such sandbox: {}",
                handle.name()
            )));
        }
        self.exec_count.fetch_add(1, Ordering::SeqCst);

        let delay = *self.exec_delay.lock();
        if let Some(delay) = delay {
            if delay >= spec.timeout {
                tokio::time::sleep(spec.timeout).await;
                return Ok(ExecOutput {
                    exit_code: -1,
                    stdout: String::new(),
                    stderr: format!(
                        "command killed after {}s timeout",
                        spec.timeout.as_secs()
                    ),
                    timed_out: true,
                });
            }
            tokio::time::sleep(delay).await;
        }

        let script = self.script.lock();
        Ok(match script.as_ref() {
            Some(f) => f(handle.name(), &spec),
            None => Self::ok_output(""),
        })
    }

    async fn inspect(&self, handle: &SandboxHandle) -> Result<SandboxState> {
        if self.sandboxes.lock().contains(handle.name()) {
            Ok(SandboxState::Running)
        } else {
            Ok(SandboxState::Missing)
        }
    }

    async fn destroy(&self, handle: &SandboxHandle) -> Result<()> {
        if self.fail_destroy.load(Ordering::SeqCst) {
            return Err(Error::Infrastructure("simulated destroy failure".into()));
        }
        self.sandboxes.lock().remove(handle.name());
        self.destroyed.lock().push(handle.name().to_string());
        Ok(())
    }
}
