//! Route handlers.

pub mod containers;
pub mod health;
