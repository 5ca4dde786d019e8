//! Request rejection taxonomy.
//!
//! These three reasons are the only information about a failed request that
//! crosses the process boundary. The discriminant is a single byte followed by
//! the reason-specific fields.

use std::fmt;

use crate::codec::{PayloadReader, PayloadWriter};
use crate::error::{ProtocolError, ProtocolResult};

/// Wire discriminant of a [`Rejection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RejectReason {
    UnknownHandler = 0,
    InternalFailure = 1,
    CustomMessage = 2,
}

impl TryFrom<u8> for RejectReason {
    type Error = ProtocolError;

    fn try_from(value: u8) -> ProtocolResult<Self> {
        match value {
            0 => Ok(Self::UnknownHandler),
            1 => Ok(Self::InternalFailure),
            2 => Ok(Self::CustomMessage),
            other => Err(ProtocolError::UnknownRejectReason(other)),
        }
    }
}

/// Why a request was not answered with a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The responder has no handler for the requested name.
    ///
    /// `namespace_known` is false when the responder did not recognize the
    /// namespace at all.
    UnknownHandler { namespace_known: bool },
    /// The handler failed; details stay on the responder.
    InternalFailure,
    /// The handler rejected the request with a caller-facing message.
    CustomMessage(String),
}

impl Rejection {
    pub fn unknown_namespace() -> Self {
        Self::UnknownHandler {
            namespace_known: false,
        }
    }

    pub fn unknown_handler() -> Self {
        Self::UnknownHandler {
            namespace_known: true,
        }
    }

    pub fn custom(message: impl Into<String>) -> Self {
        Self::CustomMessage(message.into())
    }

    pub fn reason(&self) -> RejectReason {
        match self {
            Self::UnknownHandler { .. } => RejectReason::UnknownHandler,
            Self::InternalFailure => RejectReason::InternalFailure,
            Self::CustomMessage(_) => RejectReason::CustomMessage,
        }
    }

    pub fn write_to(&self, writer: &mut PayloadWriter) {
        writer.write_u8(self.reason() as u8);
        match self {
            Self::UnknownHandler { namespace_known } => {
                writer.write_bool(*namespace_known);
            }
            Self::InternalFailure => {}
            Self::CustomMessage(message) => {
                writer.write_str(message);
            }
        }
    }

    pub fn read_from(reader: &mut PayloadReader) -> ProtocolResult<Self> {
        match RejectReason::try_from(reader.read_u8()?)? {
            RejectReason::UnknownHandler => Ok(Self::UnknownHandler {
                namespace_known: reader.read_bool()?,
            }),
            RejectReason::InternalFailure => Ok(Self::InternalFailure),
            RejectReason::CustomMessage => Ok(Self::CustomMessage(reader.read_string()?)),
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownHandler => f.write_str("unknown handler"),
            Self::InternalFailure => f.write_str("internal failure"),
            Self::CustomMessage => f.write_str("custom message"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn through_wire(rejection: &Rejection) -> Rejection {
        let mut writer = PayloadWriter::new();
        rejection.write_to(&mut writer);
        Rejection::read_from(&mut PayloadReader::new(writer.freeze())).unwrap()
    }

    #[test]
    fn unknown_handler_carries_flag() {
        let mut writer = PayloadWriter::new();
        Rejection::unknown_namespace().write_to(&mut writer);
        assert_eq!(writer.as_slice(), &[0, 0]);

        assert_eq!(
            through_wire(&Rejection::unknown_handler()),
            Rejection::UnknownHandler {
                namespace_known: true
            }
        );
    }

    #[test]
    fn internal_failure_is_one_byte() {
        let mut writer = PayloadWriter::new();
        Rejection::InternalFailure.write_to(&mut writer);
        assert_eq!(writer.as_slice(), &[1]);
    }

    #[test]
    fn custom_message_verbatim() {
        let rejection = Rejection::custom("not ready");
        assert_eq!(through_wire(&rejection), rejection);
    }

    #[test]
    fn unknown_reason_byte() {
        let mut reader = PayloadReader::new(vec![9u8]);
        assert!(matches!(
            Rejection::read_from(&mut reader),
            Err(ProtocolError::UnknownRejectReason(9))
        ));
    }
}
