//! Server configuration.

use std::path::PathBuf;
use std::time::Duration;

use netmux_core::default_socket_path;

/// Settings for [`SocketServer`](crate::SocketServer).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub socket_path: PathBuf,

    /// Time allowed for writing one frame to a client. A client that
    /// stalls longer loses its connection.
    pub write_timeout: Duration,

    /// Connections served at once; further clients wait in the backlog.
    pub max_connections: usize,

    /// Remove a socket file left behind by a dead server instead of
    /// refusing to start.
    pub cleanup_stale_socket: bool,

    /// Frames queued per client before reliable sends fail and unreliable
    /// sends are dropped.
    pub outbound_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            write_timeout: Duration::from_secs(30),
            max_connections: 100,
            cleanup_stale_socket: true,
            outbound_queue: 256,
        }
    }
}

impl ServerConfig {
    /// Default settings bound to `socket_path`.
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            ..Default::default()
        }
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_cleanup_stale_socket(mut self, cleanup: bool) -> Self {
        self.cleanup_stale_socket = cleanup;
        self
    }

    /// Sets the per-client outbound queue depth, at least 1.
    pub fn with_outbound_queue(mut self, depth: usize) -> Self {
        self.outbound_queue = depth.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_the_shared_socket_path() {
        let config = ServerConfig::default();
        assert_eq!(config.socket_path, default_socket_path());
        assert_eq!(config.write_timeout, Duration::from_secs(30));
        assert!(config.cleanup_stale_socket);
        assert_eq!(config.outbound_queue, 256);
    }

    #[test]
    fn zero_queue_depth_is_clamped() {
        let config = ServerConfig::new("/custom/path.sock")
            .with_write_timeout(Duration::from_secs(60))
            .with_max_connections(50)
            .with_cleanup_stale_socket(false)
            .with_outbound_queue(0);

        assert_eq!(config.socket_path, PathBuf::from("/custom/path.sock"));
        assert_eq!(config.write_timeout, Duration::from_secs(60));
        assert_eq!(config.max_connections, 50);
        assert!(!config.cleanup_stale_socket);
        assert_eq!(config.outbound_queue, 1);
    }
}
