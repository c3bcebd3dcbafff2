//! Background destruction of expired sandboxes.

use crate::exec::LockMap;
use crate::registry::Registry;
use crate::runtime::SandboxRuntime;
use crate::types::ContainerStatus;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Periodically destroys sandboxes past their expiration time.
///
/// Expiry is claimed with a compare-and-set so a concurrent explicit
/// delete can never double-destroy. A sandbox whose destruction fails
/// stays in `Expired` (commands can no longer reach it) and is retried
/// on the next tick. Records without an expiration are never touched.
pub struct Reaper {
    registry: Arc<Registry>,
    runtime: Arc<dyn SandboxRuntime>,
    exec_locks: LockMap,
    interval: Duration,
}

/// Handle to a running reaper task.
pub struct ReaperHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ReaperHandle {
    /// Stop the reaper. Runs one final best-effort sweep that attempts
    /// to destroy every sandbox still registered.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            warn!("Reaper task ended abnormally: {e}");
        }
    }
}

impl Reaper {
    pub(crate) fn new(
        registry: Arc<Registry>,
        runtime: Arc<dyn SandboxRuntime>,
        exec_locks: LockMap,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            runtime,
            exec_locks,
            interval,
        }
    }

    /// Start the background task.
    pub fn spawn(self) -> ReaperHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(shutdown_rx));
        ReaperHandle { shutdown_tx, task }
    }

    async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!("Reaper started, tick interval {:?}", self.interval);
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick of `interval` fires immediately; skip it so a
        // freshly started service does not sweep at t=0.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep().await;
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        self.final_sweep().await;
        info!("Reaper stopped");
    }

    /// One pass over the registry.
    async fn sweep(&self) {
        let now = Utc::now();
        for record in self.registry.list() {
            match record.status {
                ContainerStatus::Running if record.is_expired_at(now) => {
                    // Claim the expiry; a concurrent delete may win instead
                    match self.registry.compare_and_set_status(
                        &record.id,
                        ContainerStatus::Running,
                        ContainerStatus::Expired,
                    ) {
                        Ok(true) => {
                            info!("Container {} expired", record.id);
                            self.destroy_and_remove(&record.id, &record.handle).await;
                        }
                        Ok(false) => debug!("Lost expiry race for {}", record.id),
                        Err(_) => {}
                    }
                }
                // Destruction failed on an earlier tick; retry
                ContainerStatus::Expired => {
                    self.destroy_and_remove(&record.id, &record.handle).await;
                }
                _ => {}
            }
        }
    }

    async fn destroy_and_remove(&self, id: &str, handle: &crate::runtime::SandboxHandle) {
        match self.runtime.destroy(handle).await {
            Ok(()) => {
                self.registry.remove(id);
                self.exec_locks.remove(id);
                info!("Destroyed expired container {id}");
            }
            Err(e) => {
                // Record stays Expired; retried next tick
                warn!("Failed to destroy expired container {id}, will retry: {e}");
            }
        }
    }

    /// Best-effort teardown of everything still registered.
    async fn final_sweep(&self) {
        let records = self.registry.list();
        if records.is_empty() {
            return;
        }
        info!("Shutdown sweep over {} container(s)", records.len());
        for record in records {
            match self.runtime.destroy(&record.handle).await {
                Ok(()) => {
                    self.registry.remove(&record.id);
                    self.exec_locks.remove(&record.id);
                }
                Err(e) => warn!("Shutdown sweep could not destroy {}: {e}", record.id),
            }
        }
    }
}
