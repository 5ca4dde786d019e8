//! Shared plumbing for the netmux workspace: tracing setup and default paths.

pub mod paths;
pub mod tracing;

pub use paths::default_socket_path;
pub use self::tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};

/// Namespace the socket server registers for liveness checks and logging.
pub const DIAG_NAMESPACE: &str = "netmux.diag";

/// Reply to a `ping` request in [`DIAG_NAMESPACE`].
pub const PONG: &[u8] = b"pong";
