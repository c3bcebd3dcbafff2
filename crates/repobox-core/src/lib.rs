//! # repobox-core
//!
//! Container lifecycle manager for short-lived repository sandboxes.
//!
//! A sandbox is an isolated container seeded with a cloned git repository.
//! This crate owns all of the state and concurrency involved in managing
//! them:
//!
//! - **Registry**: thread-safe in-memory table of sandbox records
//! - **Provisioner**: creates a sandbox and clones a repository into it
//! - **Executor**: runs commands inside a sandbox under a time bound
//! - **Filesystem accessor**: read-only browse/read constrained to the workspace
//! - **Reaper**: background task destroying expired sandboxes
//!
//! The underlying container engine is reached through the [`SandboxRuntime`]
//! capability trait. [`runtime::DockerRuntime`] drives the `docker` CLI;
//! [`runtime::MemoryRuntime`] is a scriptable stand-in for tests and
//! offline development. [`ContainerService`] composes the pieces and is the
//! only type adapter layers (HTTP, CLI) need to touch.

pub mod error;
pub mod exec;
pub mod fsaccess;
pub mod id;
pub mod provision;
pub mod reaper;
pub mod registry;
pub mod runtime;
pub mod service;
pub mod settings;
pub mod types;

// Re-exports for convenience
pub use error::{Error, Result};
pub use registry::Registry;
pub use runtime::SandboxRuntime;
pub use service::{ContainerService, ServiceStats};
pub use settings::Settings;
pub use types::{
    CommandOutcome, ContainerRecord, ContainerStatus, ContainerView, CreateRequest, DirEntry,
    EntryKind, FileContent,
};
