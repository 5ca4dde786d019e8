//! Wire format for netmux.
//!
//! Frames are addressed by a namespace identity and a handler name instead of
//! a numeric message id, so independent registrants never collide. The crate
//! is transport-agnostic: it turns frames into bytes and back, and offers
//! optional length-prefixed framing for stream transports.
//!
//! # Example
//!
//! ```rust
//! use netmux_protocol::{Frame, encode_envelope};
//!
//! let bytes = encode_envelope("pkg.a", "ping", &[0x01, 0x02]);
//! let Frame::Packet(envelope) = Frame::decode(bytes).unwrap() else {
//!     unreachable!()
//! };
//! assert_eq!(envelope.name, "ping");
//! ```

mod codec;
mod envelope;
mod error;
mod framing;
mod rejection;

pub use codec::{PayloadReader, PayloadWriter};
pub use envelope::{
    BadPacketNotice, Envelope, Frame, FrameHeader, FrameKind, RejectEnvelope, RequestEnvelope,
    ResolveEnvelope, decode_envelope, encode_envelope,
};
pub use error::{ProtocolError, ProtocolResult};
pub use framing::{FrameReader, FrameWriter, decode_frame, encode_frame};
pub use rejection::{RejectReason, Rejection};

/// Maximum size of a single stream frame (8 MiB).
///
/// Only enforced by the stream framing layer; the engine itself does not
/// limit payload sizes.
pub const MAX_FRAME_SIZE: u32 = 8 * 1024 * 1024;
