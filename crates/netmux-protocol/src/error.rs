//! Protocol error types.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while encoding, decoding or framing messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The buffer ended before a field could be read.
    #[error("truncated frame: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    /// A length prefix was negative.
    #[error("negative length prefix: {0}")]
    NegativeLength(i32),

    /// A string field was not valid UTF-8.
    #[error("invalid UTF-8 in string field: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// A boolean field held something other than 0 or 1.
    #[error("invalid boolean byte: {0:#04x}")]
    InvalidBool(u8),

    /// The leading frame-kind byte is not known.
    #[error("unknown frame kind: {0:#04x}")]
    UnknownFrameKind(u8),

    /// The frame kind was valid but not the one the caller asked for.
    #[error("unexpected frame kind: expected {expected}, found {found}")]
    UnexpectedFrameKind {
        expected: crate::FrameKind,
        found: crate::FrameKind,
    },

    /// The rejection reason discriminant is not known.
    #[error("unknown rejection reason: {0:#04x}")]
    UnknownRejectReason(u8),

    /// A stream frame exceeds the maximum allowed size.
    #[error("frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: u32, max: u32 },

    /// A stream frame had a zero length prefix.
    #[error("empty frame")]
    EmptyFrame,

    /// IO error during read/write.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
