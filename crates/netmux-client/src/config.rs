//! Client configuration.
//!
//! All settings live in a single `config.toml` file at
//! `~/.config/netmux/config.toml` by default. Command-line flags override
//! what the file says.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use netmux_engine::NodeConfig;
#[cfg(feature = "server")]
use netmux_server::ServerConfig;

/// Configuration for the netmux CLI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Debug mode.
    pub debug: bool,

    /// Socket and connection settings.
    #[serde(default)]
    pub server: ServerSettings,

    /// Request settings.
    #[serde(default)]
    pub requests: RequestSettings,
}

/// Socket and connection settings, shared by `netmux server` and the
/// commands that connect to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Path to the server socket.
    pub socket_path: Option<PathBuf>,

    /// Connection timeout in seconds.
    pub timeout: u64,

    /// Maximum concurrent connections accepted by `netmux server`.
    pub max_connections: usize,

    /// Frames queued per connection.
    pub outbound_queue: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            socket_path: None,
            timeout: 5,
            max_connections: 100,
            outbound_queue: 256,
        }
    }
}

/// Request settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestSettings {
    /// Seconds to wait for a reply. Unset waits as long as the connection
    /// lives.
    pub timeout: Option<u64>,
}

impl ClientConfig {
    /// Loads configuration from the default path.
    pub fn load() -> Result<Self, String> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, String> {
        let content =
            std::fs::read_to_string(path).map_err(|e| format!("failed to read config: {}", e))?;
        toml::from_str(&content).map_err(|e| format!("failed to parse config: {}", e))
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Returns the default configuration directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("netmux")
    }

    /// Socket path from the file, or the platform default.
    pub fn socket_path(&self) -> PathBuf {
        self.server
            .socket_path
            .clone()
            .unwrap_or_else(netmux_core::default_socket_path)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.server.timeout)
    }

    /// Node settings for client connections.
    pub fn node_config(&self) -> NodeConfig {
        match self.requests.timeout {
            Some(secs) => NodeConfig::default().with_request_timeout(Duration::from_secs(secs)),
            None => NodeConfig::default(),
        }
    }

    /// Socket server settings for `netmux server`.
    #[cfg(feature = "server")]
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig::new(self.socket_path())
            .with_write_timeout(self.connect_timeout())
            .with_max_connections(self.server.max_connections)
            .with_outbound_queue(self.server.outbound_queue)
    }
}
