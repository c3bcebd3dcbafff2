//! REST gateway exposing the sandbox lifecycle service over HTTP.
//!
//! The gateway is a thin adapter: request bodies deserialize into core
//! types, core errors map onto HTTP statuses with a uniform JSON error
//! body, and all behavior lives in [`repobox_core::ContainerService`].

pub mod error;
pub mod handlers;
pub mod server;

pub use error::{ApiError, ErrorBody};
pub use server::{router, serve, GatewayConfig, DEFAULT_PORT};
