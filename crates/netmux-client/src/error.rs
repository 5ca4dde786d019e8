//! Client error types.

use std::fmt;

use netmux_engine::{RequestError, TransportError};
#[cfg(feature = "server")]
use netmux_server::ServerError;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in the client.
#[derive(Debug)]
pub enum ClientError {
    /// Configuration error.
    Config(String),
    /// IO error.
    Io(std::io::Error),
    /// Connection to server failed.
    Connection(String),
    /// Protocol/framing error.
    Protocol(String),
    /// Operation timed out.
    Timeout(String),
    /// Invalid command-line input.
    InvalidInput(String),
    /// A request failed.
    Request(RequestError),
    /// The hosted server failed.
    #[cfg(feature = "server")]
    Server(ServerError),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {}", msg),
            Self::Io(err) => write!(f, "IO error: {}", err),
            Self::Connection(msg) => write!(f, "connection error: {}", msg),
            Self::Protocol(msg) => write!(f, "protocol error: {}", msg),
            Self::Timeout(msg) => write!(f, "timeout: {}", msg),
            Self::InvalidInput(msg) => write!(f, "invalid input: {}", msg),
            Self::Request(err) => write!(f, "request failed: {}", err),
            #[cfg(feature = "server")]
            Self::Server(err) => write!(f, "server error: {}", err),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Request(err) => Some(err),
            #[cfg(feature = "server")]
            Self::Server(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<RequestError> for ClientError {
    fn from(err: RequestError) -> Self {
        Self::Request(err)
    }
}

impl From<TransportError> for ClientError {
    fn from(err: TransportError) -> Self {
        Self::Connection(err.to_string())
    }
}

#[cfg(feature = "server")]
impl From<ServerError> for ClientError {
    fn from(err: ServerError) -> Self {
        Self::Server(err)
    }
}
