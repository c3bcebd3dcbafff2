//! The facade adapters talk to.

use crate::error::Error;
use crate::exec::{CommandPolicy, Executor};
use crate::fsaccess::FsAccessor;
use crate::provision::Provisioner;
use crate::reaper::{Reaper, ReaperHandle};
use crate::registry::Registry;
use crate::runtime::{SandboxRuntime, SandboxState};
use crate::settings::Settings;
use crate::types::{
    CommandOutcome, ContainerRecord, ContainerStatus, CreateRequest, DirEntry, FileContent,
};
use crate::Result;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Observability snapshot for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStats {
    /// Seconds since the service was constructed.
    pub uptime_secs: u64,

    /// Total registered containers.
    pub total_containers: usize,

    /// Containers currently in `Running` status.
    pub active_containers: usize,

    /// Whether the container engine answered a ping.
    pub runtime_available: bool,
}

/// Composes the registry, provisioner, executor, filesystem accessor,
/// and reaper behind one object. Constructed once per process; adapter
/// layers (HTTP, CLI) hold it in an `Arc` and call these methods.
pub struct ContainerService {
    settings: Arc<Settings>,
    registry: Arc<Registry>,
    runtime: Arc<dyn SandboxRuntime>,
    provisioner: Provisioner,
    executor: Executor,
    fs: FsAccessor,
    started_at: Instant,
}

impl ContainerService {
    pub fn new(settings: Settings, runtime: Arc<dyn SandboxRuntime>) -> Self {
        let settings = Arc::new(settings);
        let registry = Arc::new(Registry::new());
        Self {
            provisioner: Provisioner::new(registry.clone(), runtime.clone(), settings.clone()),
            executor: Executor::new(registry.clone(), runtime.clone(), settings.clone()),
            fs: FsAccessor::new(registry.clone(), runtime.clone(), settings.clone()),
            settings,
            registry,
            runtime,
            started_at: Instant::now(),
        }
    }

    /// Install a command policy predicate on the executor.
    pub fn with_command_policy(mut self, policy: CommandPolicy) -> Self {
        self.executor.set_policy(policy);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Start the background reaper at the configured tick interval.
    pub fn spawn_reaper(&self) -> ReaperHandle {
        Reaper::new(
            self.registry.clone(),
            self.runtime.clone(),
            self.executor.lock_map(),
            self.settings.reap_interval,
        )
        .spawn()
    }

    /// Create a sandbox seeded with a cloned repository.
    pub async fn create(&self, req: CreateRequest) -> Result<ContainerRecord> {
        self.provisioner.create(req, &self.executor).await
    }

    /// Snapshot of one container, reconciled against the engine.
    ///
    /// A container whose process exited on its own becomes `Stopped`;
    /// one the engine has lost track of becomes `Failed`. Engine errors
    /// during reconciliation are logged and the last known state served.
    pub async fn get(&self, id: &str) -> Result<ContainerRecord> {
        let record = self.registry.get(id)?;
        if record.status != ContainerStatus::Running {
            return Ok(record);
        }
        match self.runtime.inspect(&record.handle).await {
            Ok(SandboxState::Running) => Ok(record),
            Ok(SandboxState::Exited) => {
                let _ = self
                    .registry
                    .compare_and_set_status(id, ContainerStatus::Running, ContainerStatus::Stopped);
                self.registry.get(id)
            }
            Ok(SandboxState::Missing) => {
                warn!("Container {id} vanished from the engine");
                let _ = self
                    .registry
                    .compare_and_set_status(id, ContainerStatus::Running, ContainerStatus::Failed);
                self.registry.get(id)
            }
            Err(e) => {
                debug!("Skipping status reconciliation for {id}: {e}");
                Ok(record)
            }
        }
    }

    /// Ordered snapshot of all containers.
    pub fn list(&self) -> Vec<ContainerRecord> {
        self.registry.list()
    }

    /// Destroy a container and remove its record.
    ///
    /// Unknown ids are a `NotFound`. If the engine refuses to destroy
    /// the sandbox the record is kept (no longer `Running`) and the
    /// error surfaced so the caller can retry.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let record = self.registry.get(id)?;

        // Stop new command dispatches before touching the engine. The
        // reaper may have claimed the record already; either way it is
        // no longer Running.
        let _ = self
            .registry
            .compare_and_set_status(id, ContainerStatus::Running, ContainerStatus::Stopped);

        self.runtime.destroy(&record.handle).await?;
        self.registry.remove(id);
        self.executor.forget(id);
        info!("Deleted container {id}");
        Ok(())
    }

    /// Execute a command inside a running container.
    pub async fn execute(
        &self,
        id: &str,
        command: &str,
        working_directory: Option<String>,
        timeout_secs: Option<u64>,
    ) -> Result<CommandOutcome> {
        if command.trim().is_empty() {
            return Err(Error::Validation("command must not be empty".into()));
        }
        self.executor
            .execute(id, command, working_directory, timeout_secs)
            .await
    }

    /// List a directory inside a container's workspace.
    pub async fn browse(&self, id: &str, path: &str) -> Result<(String, Vec<DirEntry>)> {
        self.fs.browse(id, path).await
    }

    /// Read a file from a container's workspace.
    pub async fn read_file(&self, id: &str, file_path: &str) -> Result<FileContent> {
        self.fs.read_file(id, file_path).await
    }

    /// Whether the container engine is reachable right now.
    pub async fn runtime_available(&self) -> bool {
        self.runtime.ping().await.is_ok()
    }

    /// Health snapshot.
    pub async fn stats(&self) -> ServiceStats {
        ServiceStats {
            uptime_secs: self.started_at.elapsed().as_secs(),
            total_containers: self.registry.len(),
            active_containers: self.registry.active_count(),
            runtime_available: self.runtime_available().await,
        }
    }
}
