//! CLI and Unix socket client for netmux.
//!
//! This crate provides the `netmux` command-line interface and
//! [`SocketClient`], which connects a client node to a running server.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod socket;

pub use cli::Cli;
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use socket::{ClientConnection, SocketClient};
