//! Shared types for sandbox records, command outcomes, and views.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::runtime::SandboxHandle;

/// Lifecycle status of a sandbox.
///
/// Transitions form a DAG: `Provisioning → Running → {Stopped, Failed,
/// Expired}`. The three right-hand states are terminal; nothing ever
/// leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerStatus {
    /// Sandbox is being created and seeded; not yet visible in the registry.
    Provisioning,
    /// Sandbox is live and accepts commands.
    Running,
    /// Sandbox was stopped by an explicit delete or exited on its own.
    Stopped,
    /// Sandbox or its underlying container failed.
    Failed,
    /// Sandbox passed its expiration time and is being torn down.
    Expired,
}

impl ContainerStatus {
    /// Whether this status admits no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Failed | Self::Expired)
    }

    /// Whether moving to `next` respects the status DAG.
    pub fn can_transition_to(self, next: Self) -> bool {
        match self {
            Self::Provisioning => matches!(next, Self::Running | Self::Failed),
            Self::Running => next.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Provisioning => "provisioning",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
            Self::Expired => "expired",
        };
        write!(f, "{s}")
    }
}

/// One sandbox instance tracked by the registry.
///
/// `id`, provenance fields, and `environment_vars` are immutable after
/// creation; only `status` and `last_command_result` change. The record
/// stays in the registry until the underlying container has been
/// destroyed (or confirmed unrecoverable).
#[derive(Debug, Clone)]
pub struct ContainerRecord {
    /// Unique id, generated by [`crate::id::container_id`].
    pub id: String,

    /// Reference to the underlying container instance.
    pub handle: SandboxHandle,

    /// Current lifecycle status.
    pub status: ContainerStatus,

    /// Repository the sandbox was seeded from.
    pub repo_url: String,

    /// Branch that was checked out (resolved default if none was requested).
    pub branch: String,

    /// Specific commit that was checked out, if any.
    pub commit: Option<String>,

    /// Insertion time.
    pub created_at: DateTime<Utc>,

    /// Expiration time; `None` means unbounded lifetime.
    pub expires_at: Option<DateTime<Utc>>,

    /// Directory inside the sandbox holding the cloned repository.
    pub working_directory: String,

    /// Environment variables injected at creation.
    pub environment_vars: HashMap<String, String>,

    /// Most recent command outcome, kept for observability.
    pub last_command_result: Option<CommandOutcome>,
}

impl ContainerRecord {
    /// Whether the record's expiration time has passed.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|t| t <= now)
    }
}

/// Caller-facing snapshot of a record. Never exposes the handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerView {
    pub id: String,
    pub status: ContainerStatus,
    pub repo_url: String,
    pub branch: String,
    pub commit: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub working_directory: String,
}

impl From<&ContainerRecord> for ContainerView {
    fn from(record: &ContainerRecord) -> Self {
        Self {
            id: record.id.clone(),
            status: record.status,
            repo_url: record.repo_url.clone(),
            branch: record.branch.clone(),
            commit: record.commit.clone(),
            created_at: record.created_at,
            expires_at: record.expires_at,
            working_directory: record.working_directory.clone(),
        }
    }
}

/// Parameters for creating a sandbox.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateRequest {
    /// Repository URL to clone.
    pub repo_url: String,

    /// Branch to check out; defaults to the conventional primary branch.
    pub branch: Option<String>,

    /// Specific commit to check out.
    pub commit: Option<String>,

    /// Lifetime bound in seconds; unbounded when omitted.
    pub max_runtime_secs: Option<u64>,

    /// Environment variables to inject into the sandbox.
    #[serde(default)]
    pub environment_vars: HashMap<String, String>,

    /// Command to run once the clone has finished. Its outcome is
    /// recorded but never fails the create call.
    pub initial_command: Option<String>,
}

/// Outcome of one command execution inside a sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOutcome {
    /// The command that was dispatched.
    pub command: String,

    /// Exit code; `-1` when the process was killed or never reported one.
    pub exit_code: i64,

    /// Captured standard output.
    pub stdout: String,

    /// Captured standard error.
    pub stderr: String,

    /// Wall-clock time around the dispatch, in seconds.
    pub elapsed_secs: f64,

    /// Whether the command was forcibly terminated at its deadline.
    pub timed_out: bool,

    /// When the command finished.
    pub timestamp: DateTime<Utc>,
}

/// Kind of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    Other,
}

impl EntryKind {
    /// Map a `find -printf %y` type character.
    pub(crate) fn from_find_type(c: char) -> Self {
        match c {
            'f' => Self::File,
            'd' => Self::Directory,
            'l' => Self::Symlink,
            _ => Self::Other,
        }
    }
}

/// One entry returned by a directory browse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirEntry {
    /// Entry name (no path components).
    pub name: String,

    /// File, directory, symlink, or other.
    pub kind: EntryKind,

    /// Size in bytes; `None` for non-files.
    pub size: Option<u64>,
}

/// Raw content of a file read out of a sandbox.
#[derive(Debug, Clone)]
pub struct FileContent {
    /// Normalized absolute path inside the sandbox.
    pub path: String,

    /// Size in bytes as reported by the sandbox.
    pub size: u64,

    /// The file's bytes.
    pub bytes: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_dag() {
        use ContainerStatus::*;
        assert!(Provisioning.can_transition_to(Running));
        assert!(Provisioning.can_transition_to(Failed));
        assert!(Running.can_transition_to(Stopped));
        assert!(Running.can_transition_to(Expired));
        assert!(Running.can_transition_to(Failed));
        // Terminal states absorb
        assert!(!Stopped.can_transition_to(Running));
        assert!(!Expired.can_transition_to(Running));
        assert!(!Failed.can_transition_to(Stopped));
        // No skipping provisioning straight to terminal
        assert!(!Provisioning.can_transition_to(Expired));
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let s = serde_json::to_string(&ContainerStatus::Provisioning).unwrap();
        assert_eq!(s, "\"provisioning\"");
    }

    #[test]
    fn test_expiry_check() {
        let now = Utc::now();
        let record = ContainerRecord {
            id: "sbx-1".into(),
            handle: SandboxHandle::new("sbx-1"),
            status: ContainerStatus::Running,
            repo_url: "https://example.com/org/repo".into(),
            branch: "main".into(),
            commit: None,
            created_at: now - chrono::Duration::seconds(10),
            expires_at: Some(now - chrono::Duration::seconds(1)),
            working_directory: "/workspace".into(),
            environment_vars: HashMap::new(),
            last_command_result: None,
        };
        assert!(record.is_expired_at(now));

        let unbounded = ContainerRecord {
            expires_at: None,
            ..record
        };
        assert!(!unbounded.is_expired_at(now));
    }

    #[test]
    fn test_view_hides_handle() {
        let json = serde_json::to_value(ContainerView {
            id: "sbx-1".into(),
            status: ContainerStatus::Running,
            repo_url: "https://example.com/org/repo".into(),
            branch: "develop".into(),
            commit: None,
            created_at: Utc::now(),
            expires_at: None,
            working_directory: "/workspace".into(),
        })
        .unwrap();
        assert!(json.get("handle").is_none());
        assert_eq!(json["branch"], "develop");
        assert!(json["commit"].is_null());
    }
}
