//! Thread-safe in-memory table of sandbox records.

use crate::error::Error;
use crate::types::{CommandOutcome, ContainerRecord, ContainerStatus};
use crate::Result;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::warn;

/// The registry of sandbox records.
///
/// All mutations are serialized through one lock, and the lock is never
/// held across an await point. Reads hand out cloned snapshots, so a
/// caller can never observe a record mid-mutation. Constructed once per
/// process and shared explicitly; never a global.
#[derive(Default)]
pub struct Registry {
    records: RwLock<HashMap<String, ContainerRecord>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new record. Fails with a conflict error on id collision.
    pub fn insert(&self, record: ContainerRecord) -> Result<()> {
        let mut records = self.records.write();
        if records.contains_key(&record.id) {
            return Err(Error::Conflict(record.id));
        }
        records.insert(record.id.clone(), record);
        Ok(())
    }

    /// Snapshot of one record.
    pub fn get(&self, id: &str) -> Result<ContainerRecord> {
        self.records
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("container {id}")))
    }

    /// Snapshot of all records, ordered by creation time (id as
    /// tiebreaker). Safe to iterate while mutations occur.
    pub fn list(&self) -> Vec<ContainerRecord> {
        let mut records: Vec<_> = self.records.read().values().cloned().collect();
        records.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        records
    }

    /// Remove a record, returning it if present.
    ///
    /// Callers must only do this after the underlying sandbox has been
    /// destroyed (or confirmed unrecoverable).
    pub fn remove(&self, id: &str) -> Option<ContainerRecord> {
        self.records.write().remove(id)
    }

    /// Atomically transition `id` from `expected` to `new`.
    ///
    /// Returns `Ok(true)` if the transition was applied, `Ok(false)` if
    /// the record's status was not `expected` (e.g. a concurrent delete
    /// won the race), and `NotFound` if the id is unknown.
    pub fn compare_and_set_status(
        &self,
        id: &str,
        expected: ContainerStatus,
        new: ContainerStatus,
    ) -> Result<bool> {
        let mut records = self.records.write();
        let record = records
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("container {id}")))?;
        if record.status != expected {
            return Ok(false);
        }
        record.status = new;
        Ok(true)
    }

    /// Unconditionally set a record's status, respecting the status DAG.
    pub fn set_status(&self, id: &str, status: ContainerStatus) -> Result<()> {
        let mut records = self.records.write();
        let record = records
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("container {id}")))?;
        if record.status == status {
            return Ok(());
        }
        if !record.status.can_transition_to(status) {
            return Err(Error::InvalidState {
                id: id.to_string(),
                status: record.status,
            });
        }
        record.status = status;
        Ok(())
    }

    /// Record the outcome of the most recent command. A missing record
    /// (deleted while the command ran) is logged, not an error.
    pub fn record_command(&self, id: &str, outcome: CommandOutcome) {
        let mut records = self.records.write();
        match records.get_mut(id) {
            Some(record) => record.last_command_result = Some(outcome),
            None => warn!("Dropping command outcome for removed container {id}"),
        }
    }

    /// Total number of records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Number of records currently in `Running` status.
    pub fn active_count(&self) -> usize {
        self.records
            .read()
            .values()
            .filter(|r| r.status == ContainerStatus::Running)
            .count()
    }
}
