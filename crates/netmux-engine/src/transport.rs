//! The transport seam.
//!
//! The engine never owns sockets or connection tables. It hands encoded
//! frames to a [`Transport`] and expects the transport to call
//! [`Node::route`](crate::Node::route) for every frame it receives.

use std::fmt;

use bytes::Bytes;
use thiserror::Error;

use netmux_protocol::ProtocolError;

/// Identity of a connected client as assigned by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u64);

impl ClientId {
    /// The client hosted inside the server process.
    ///
    /// Traffic between the server and this client never touches the
    /// transport; transports assign remote clients ids starting at 1.
    pub const HOST: ClientId = ClientId(0);

    pub fn is_host(self) -> bool {
        self == Self::HOST
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client#{}", self.0)
    }
}

/// One end of a connection: the single server or one of its clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Peer {
    Server,
    Client(ClientId),
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server => f.write_str("server"),
            Self::Client(id) => id.fmt(f),
        }
    }
}

/// How the transport should deliver a frame. Passed through unmodified.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DeliveryMode {
    Unreliable,
    UnreliableNoDelay,
    #[default]
    Reliable,
    ReliableBuffered,
}

impl DeliveryMode {
    pub fn is_reliable(self) -> bool {
        matches!(self, Self::Reliable | Self::ReliableBuffered)
    }
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors a transport reports when it cannot accept a frame.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No connection exists for the peer.
    #[error("unknown peer: {0}")]
    UnknownPeer(Peer),

    /// The connection to the peer has been closed.
    #[error("connection to {0} is closed")]
    Closed(Peer),

    /// The peer's outbound queue is full.
    #[error("outbound queue for {0} is full")]
    QueueFull(Peer),

    /// This side of the connection cannot address the peer.
    #[error("{0} is not reachable from this endpoint")]
    Unroutable(Peer),

    /// The frame could not be framed for the stream.
    #[error("framing error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Outbound half of a transport.
///
/// Implementations queue the frame and return; they must not call back into
/// the engine synchronously from `send_to_one`.
pub trait Transport: Send + Sync + 'static {
    /// Sends one frame to one peer.
    fn send_to_one(&self, target: Peer, frame: Bytes, mode: DeliveryMode) -> TransportResult<()>;

    /// Sends the same frame to several clients.
    ///
    /// The default implementation keeps going after a failed recipient and
    /// returns the first error.
    fn send_to_many(
        &self,
        targets: &[ClientId],
        frame: Bytes,
        mode: DeliveryMode,
    ) -> TransportResult<()> {
        let mut first_error = None;
        for &client in targets {
            if let Err(e) = self.send_to_one(Peer::Client(client), frame.clone(), mode) {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
