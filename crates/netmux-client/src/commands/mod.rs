//! Command implementations.

pub mod config;
pub mod request;
#[cfg(feature = "server")]
pub mod server;
