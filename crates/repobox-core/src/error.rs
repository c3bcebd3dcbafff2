//! Error types for sandbox lifecycle operations.

use crate::types::ContainerStatus;
use thiserror::Error;

/// Core result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the container lifecycle manager.
///
/// Every variant maps to a caller-visible failure class; no operation
/// leaves partial registry state behind when it returns an error.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed input, rejected before any side effect.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Unknown container id, file, or directory.
    #[error("not found: {0}")]
    NotFound(String),

    /// Operation not valid for the container's current status.
    #[error("container {id} is {status}, operation requires a running container")]
    InvalidState { id: String, status: ContainerStatus },

    /// Registry id collision. The generation scheme makes this
    /// unreachable in practice, but insertion still checks.
    #[error("container id already registered: {0}")]
    Conflict(String),

    /// Clone or sandbox setup failed; the partial sandbox was destroyed.
    #[error("provisioning failed: {0}")]
    Provision(String),

    /// An internal command against the sandbox exceeded its deadline.
    #[error("operation timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// Requested path resolves outside the sandbox workspace.
    #[error("path escapes the sandbox workspace: {0}")]
    PathTraversal(String),

    /// File exceeds the configured read ceiling; content is never truncated.
    #[error("file is {size} bytes, exceeds the {limit} byte limit")]
    SizeExceeded { size: u64, limit: u64 },

    /// Container engine unreachable or exhausted.
    #[error("runtime unavailable: {0}")]
    Infrastructure(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Short machine-readable kind, used by adapters for error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound(_) => "not_found",
            Self::InvalidState { .. } => "invalid_state",
            Self::Conflict(_) => "conflict",
            Self::Provision(_) => "provision_error",
            Self::Timeout { .. } => "timeout",
            Self::PathTraversal(_) => "path_traversal",
            Self::SizeExceeded { .. } => "size_exceeded",
            Self::Infrastructure(_) => "infrastructure_error",
            Self::Io(_) => "io_error",
        }
    }
}
