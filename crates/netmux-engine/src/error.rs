//! Engine error types.
//!
//! Handlers report failure through [`HandlerError`]. Callers of a request see
//! a [`RequestError`]; when the failure came back over the wire it is a
//! [`RequestRejection`] carrying one of the three [`Rejection`] reasons.

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;

use netmux_protocol::{ProtocolError, Rejection};

use crate::transport::TransportError;

/// Boxed error type used for handler faults.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Outcome of a request: the reply bytes or why there are none.
pub type RequestResult = Result<Bytes, RequestError>;

/// Failure returned by a packet or request handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Deliberate rejection. The message is shown to the caller verbatim,
    /// including remote callers.
    #[error("{0}")]
    Rejected(String),

    /// Anything else. Remote callers only learn that the handler failed.
    #[error("handler fault: {0}")]
    Fault(#[source] BoxError),
}

impl HandlerError {
    /// Rejects the request with a caller-facing message.
    pub fn reject(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }

    /// Wraps an arbitrary error as a fault.
    pub fn fault(error: impl Into<BoxError>) -> Self {
        Self::Fault(error.into())
    }
}

impl From<ProtocolError> for HandlerError {
    fn from(error: ProtocolError) -> Self {
        Self::Fault(Box::new(error))
    }
}

/// A request that the responder refused, with the addressing it was sent to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestRejection {
    pub namespace: String,
    pub name: String,
    pub rejection: Rejection,
}

impl RequestRejection {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, rejection: Rejection) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            rejection,
        }
    }

    /// True when the responder did not know the namespace or the handler.
    pub fn is_unknown_handler(&self) -> bool {
        matches!(self.rejection, Rejection::UnknownHandler { .. })
    }
}

impl fmt::Display for RequestRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.rejection {
            Rejection::UnknownHandler {
                namespace_known: true,
            } => write!(
                f,
                "namespace `{}` has no request handler `{}`",
                self.namespace, self.name
            ),
            Rejection::UnknownHandler {
                namespace_known: false,
            } => write!(f, "unknown namespace `{}`", self.namespace),
            Rejection::InternalFailure => write!(
                f,
                "request `{}` in namespace `{}` failed on the responder",
                self.name, self.namespace
            ),
            Rejection::CustomMessage(message) => f.write_str(message),
        }
    }
}

impl std::error::Error for RequestRejection {}

/// Why a request produced no result.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The responder answered with a rejection.
    #[error(transparent)]
    Rejected(#[from] RequestRejection),

    /// A handler invoked through local loopback failed. The original error is
    /// preserved since no process boundary was crossed.
    #[error("request handler failed: {0}")]
    Handler(#[source] BoxError),

    /// The transport refused the outbound frame.
    #[error("failed to send request: {0}")]
    Transport(#[from] TransportError),

    /// The reply frame could not be decoded.
    #[error("malformed reply to `{name}` in namespace `{namespace}`: {reason}")]
    MalformedReply {
        namespace: String,
        name: String,
        reason: String,
    },

    /// No reply arrived within the configured timeout.
    #[error("request `{name}` in namespace `{namespace}` timed out after {after:?}")]
    TimedOut {
        namespace: String,
        name: String,
        after: Duration,
    },

    /// The peer went away before replying.
    #[error("peer disconnected before replying")]
    Disconnected,

    /// Only a server can address clients.
    #[error("only the server can send requests to clients")]
    NotServer,
}

impl RequestError {
    /// The wire rejection, if the failure was one.
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Rejected(rejected) => Some(&rejected.rejection),
            _ => None,
        }
    }
}
