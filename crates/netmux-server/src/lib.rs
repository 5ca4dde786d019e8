//! Unix socket server transport for netmux.
//!
//! This crate hosts a server [`Node`](netmux_engine::Node) behind a Unix
//! socket:
//! - every connection is a client with its own id, starting at 1
//! - frames are length-prefixed on the stream
//! - closed connections fail the requests still pending with them
//! - the `netmux.diag` namespace answers liveness checks
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use netmux_engine::{NamespaceRegistry, NodeConfig};
//! use netmux_server::{ServerConfig, Shutdown, SocketServer, register_diagnostics};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = Arc::new(NamespaceRegistry::new());
//!     register_diagnostics(&registry);
//!
//!     let server = SocketServer::new(ServerConfig::default()).await?;
//!     let node = server.node(registry, NodeConfig::default());
//!
//!     let shutdown = Shutdown::new();
//!     shutdown.listen_for_signals()?;
//!     server.run_until_shutdown(node, shutdown.wait()).await?;
//!     Ok(())
//! }
//! ```

mod config;
mod diag;
mod error;
mod signals;
mod socket;

pub use config::ServerConfig;
pub use diag::register_diagnostics;
pub use error::{ServerError, ServerResult};
pub use netmux_core::default_socket_path;
pub use signals::Shutdown;
pub use socket::{Connection, ServerTransport, SocketServer};
