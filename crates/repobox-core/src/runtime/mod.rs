//! Capability interface to the container engine.
//!
//! The lifecycle manager never talks to an engine directly; it goes
//! through [`SandboxRuntime`], a narrow start/exec/inspect/destroy
//! surface. [`DockerRuntime`] adapts the `docker` CLI;
//! [`MemoryRuntime`] is an in-memory implementation for tests and
//! offline development.

mod docker;
mod memory;

pub use docker::DockerRuntime;
pub use memory::MemoryRuntime;

use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

/// Opaque reference to a live sandbox instance inside the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SandboxHandle(String);

impl SandboxHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Engine-side name of the sandbox.
    pub fn name(&self) -> &str {
        &self.0
    }
}

/// Parameters for starting a sandbox.
#[derive(Debug, Clone)]
pub struct StartSpec {
    /// Engine-side name; doubles as the container id.
    pub name: String,

    /// Image to run.
    pub image: String,

    /// Environment injected into the sandbox.
    pub env: HashMap<String, String>,

    /// Initial working directory.
    pub working_dir: String,

    /// Network the sandbox is attached to.
    pub network: String,

    /// Memory limit (engine syntax, e.g. `2g`).
    pub memory_limit: Option<String>,

    /// CPU limit in cores.
    pub cpu_limit: Option<f64>,

    /// Process-count limit.
    pub pids_limit: Option<u64>,
}

/// Parameters for one command dispatch inside a sandbox.
#[derive(Debug, Clone)]
pub struct ExecSpec {
    /// Shell command to run.
    pub command: String,

    /// Working directory for the command.
    pub working_dir: String,

    /// Hard deadline; on expiry the process and its children are killed.
    pub timeout: Duration,
}

/// Raw result of a command dispatch.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    /// Exit code; `-1` when killed or unknown.
    pub exit_code: i64,

    /// Captured standard output.
    pub stdout: String,

    /// Captured standard error.
    pub stderr: String,

    /// Whether the deadline killed the command.
    pub timed_out: bool,
}

/// Coarse engine-side state of a sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxState {
    /// Sandbox exists and is running.
    Running,
    /// Sandbox exists but its main process has exited.
    Exited,
    /// Engine no longer knows the sandbox.
    Missing,
}

/// Narrow capability surface over a container engine.
#[async_trait]
pub trait SandboxRuntime: Send + Sync {
    /// Check that the engine is reachable.
    async fn ping(&self) -> Result<()>;

    /// Start a new, empty, long-lived sandbox.
    async fn start(&self, spec: StartSpec) -> Result<SandboxHandle>;

    /// Run a command inside a sandbox. Must return within
    /// `spec.timeout` plus a small kill grace period, never hang.
    async fn exec(&self, handle: &SandboxHandle, spec: ExecSpec) -> Result<ExecOutput>;

    /// Report the engine-side state of a sandbox.
    async fn inspect(&self, handle: &SandboxHandle) -> Result<SandboxState>;

    /// Destroy a sandbox. Destroying an already-gone sandbox is not an error.
    async fn destroy(&self, handle: &SandboxHandle) -> Result<()>;
}

/// Quote a string for safe embedding in a `bash -c` script.
pub(crate) fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}
