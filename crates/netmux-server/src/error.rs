//! Server error types.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors raised while binding or running the socket server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Another server answers on the socket, or the file exists and stale
    /// cleanup is disabled.
    #[error("Socket {} is already in use", path.display())]
    SocketInUse { path: PathBuf },

    /// The directory meant to hold the socket does not exist.
    #[error("Socket directory {} does not exist", dir.display())]
    SocketDirMissing { dir: PathBuf },

    #[error("Failed to install {signal} handler: {source}")]
    Signal {
        signal: &'static str,
        #[source]
        source: io::Error,
    },

    /// The accept loop was stopped.
    #[error("Server shutdown requested")]
    Shutdown,
}

impl ServerError {
    pub(crate) fn socket_in_use(path: &Path) -> Self {
        Self::SocketInUse {
            path: path.to_path_buf(),
        }
    }

    pub(crate) fn socket_dir_missing(dir: &Path) -> Self {
        Self::SocketDirMissing {
            dir: dir.to_path_buf(),
        }
    }
}
