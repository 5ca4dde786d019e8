//! Wire frames.
//!
//! Every frame begins with a one-byte [`FrameKind`] followed by the
//! namespace identity. The rest depends on the kind:
//!
//! ```text
//! Packet:    kind, namespace, name, payload (rest of frame)
//! Request:   kind, namespace, name, request_id:i32, payload (i32 length-prefixed)
//! Resolve:   kind, namespace, request_id:i32, payload (i32 length-prefixed)
//! Reject:    kind, namespace, request_id:i32, reason:u8, [reason fields]
//! BadPacket: kind, namespace, has_name:bool, [name]
//! ```
//!
//! One-shot packets let the payload run to the end of the frame. Request and
//! resolve payloads are length-prefixed so that slack after the payload is
//! never mistaken for payload bytes.

use std::fmt;

use bytes::Bytes;

use crate::codec::{PayloadReader, PayloadWriter};
use crate::error::{ProtocolError, ProtocolResult};
use crate::rejection::Rejection;

/// Leading tag of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameKind {
    Packet = 1,
    Request = 2,
    Resolve = 3,
    Reject = 4,
    BadPacket = 5,
}

impl TryFrom<u8> for FrameKind {
    type Error = ProtocolError;

    fn try_from(value: u8) -> ProtocolResult<Self> {
        match value {
            1 => Ok(Self::Packet),
            2 => Ok(Self::Request),
            3 => Ok(Self::Resolve),
            4 => Ok(Self::Reject),
            5 => Ok(Self::BadPacket),
            other => Err(ProtocolError::UnknownFrameKind(other)),
        }
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Packet => "packet",
            Self::Request => "request",
            Self::Resolve => "resolve",
            Self::Reject => "reject",
            Self::BadPacket => "bad-packet",
        };
        f.write_str(name)
    }
}

/// Kind and namespace, the part every frame shares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    pub kind: FrameKind,
    pub namespace: String,
}

impl FrameHeader {
    /// Reads the header and leaves `reader` positioned at the kind-specific body.
    pub fn read_from(reader: &mut PayloadReader) -> ProtocolResult<Self> {
        let kind = FrameKind::try_from(reader.read_u8()?)?;
        let namespace = reader.read_string()?;
        Ok(Self { kind, namespace })
    }

    fn write_to(kind: FrameKind, namespace: &str, writer: &mut PayloadWriter) {
        writer.write_u8(kind as u8).write_str(namespace);
    }
}

/// One-shot packet: namespace, handler name and payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub namespace: String,
    pub name: String,
    pub payload: Bytes,
}

impl Envelope {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, payload: Bytes) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            payload,
        }
    }

    /// Reads the packet body after the header.
    pub fn read_body(namespace: String, reader: &mut PayloadReader) -> ProtocolResult<Self> {
        let name = reader.read_string()?;
        Ok(Self {
            namespace,
            name,
            payload: reader.read_remaining(),
        })
    }

    pub fn encode(&self) -> Bytes {
        encode_envelope(&self.namespace, &self.name, &self.payload)
    }
}

/// Outbound request: the initiating half of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestEnvelope {
    pub namespace: String,
    pub name: String,
    pub request_id: i32,
    pub payload: Bytes,
}

impl RequestEnvelope {
    pub fn read_body(namespace: String, reader: &mut PayloadReader) -> ProtocolResult<Self> {
        let name = reader.read_string()?;
        let request_id = reader.read_i32()?;
        let payload = reader.read_bytes()?;
        Ok(Self {
            namespace,
            name,
            request_id,
            payload,
        })
    }

    pub fn encode(&self) -> Bytes {
        let mut writer = PayloadWriter::with_capacity(
            1 + 12 + self.namespace.len() + self.name.len() + 4 + self.payload.len(),
        );
        FrameHeader::write_to(FrameKind::Request, &self.namespace, &mut writer);
        writer
            .write_str(&self.name)
            .write_i32(self.request_id)
            .write_bytes(&self.payload);
        writer.freeze()
    }
}

/// Successful reply to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveEnvelope {
    pub namespace: String,
    pub request_id: i32,
    pub payload: Bytes,
}

impl ResolveEnvelope {
    pub fn read_body(namespace: String, reader: &mut PayloadReader) -> ProtocolResult<Self> {
        let request_id = reader.read_i32()?;
        let payload = reader.read_bytes()?;
        Ok(Self {
            namespace,
            request_id,
            payload,
        })
    }

    pub fn encode(&self) -> Bytes {
        let mut writer =
            PayloadWriter::with_capacity(1 + 8 + self.namespace.len() + 4 + self.payload.len());
        FrameHeader::write_to(FrameKind::Resolve, &self.namespace, &mut writer);
        writer
            .write_i32(self.request_id)
            .write_bytes(&self.payload);
        writer.freeze()
    }
}

/// Failed reply to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectEnvelope {
    pub namespace: String,
    pub request_id: i32,
    pub rejection: Rejection,
}

impl RejectEnvelope {
    pub fn read_body(namespace: String, reader: &mut PayloadReader) -> ProtocolResult<Self> {
        let request_id = reader.read_i32()?;
        let rejection = Rejection::read_from(reader)?;
        Ok(Self {
            namespace,
            request_id,
            rejection,
        })
    }

    pub fn encode(&self) -> Bytes {
        let mut writer = PayloadWriter::new();
        FrameHeader::write_to(FrameKind::Reject, &self.namespace, &mut writer);
        writer.write_i32(self.request_id);
        self.rejection.write_to(&mut writer);
        writer.freeze()
    }
}

/// Informational notice that a one-shot packet could not be routed.
///
/// `name` is only present when the receiver recognized the namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadPacketNotice {
    pub namespace: String,
    pub name: Option<String>,
}

impl BadPacketNotice {
    pub fn read_body(namespace: String, reader: &mut PayloadReader) -> ProtocolResult<Self> {
        let name = if reader.read_bool()? {
            Some(reader.read_string()?)
        } else {
            None
        };
        Ok(Self { namespace, name })
    }

    pub fn encode(&self) -> Bytes {
        let mut writer = PayloadWriter::new();
        FrameHeader::write_to(FrameKind::BadPacket, &self.namespace, &mut writer);
        match &self.name {
            Some(name) => writer.write_bool(true).write_str(name),
            None => writer.write_bool(false),
        };
        writer.freeze()
    }
}

impl fmt::Display for BadPacketNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(
                f,
                "peer has no packet handler `{}` in namespace `{}`",
                name, self.namespace
            ),
            None => write!(f, "peer does not know namespace `{}`", self.namespace),
        }
    }
}

/// Any frame, fully decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Packet(Envelope),
    Request(RequestEnvelope),
    Resolve(ResolveEnvelope),
    Reject(RejectEnvelope),
    BadPacket(BadPacketNotice),
}

impl Frame {
    pub fn kind(&self) -> FrameKind {
        match self {
            Self::Packet(_) => FrameKind::Packet,
            Self::Request(_) => FrameKind::Request,
            Self::Resolve(_) => FrameKind::Resolve,
            Self::Reject(_) => FrameKind::Reject,
            Self::BadPacket(_) => FrameKind::BadPacket,
        }
    }

    pub fn namespace(&self) -> &str {
        match self {
            Self::Packet(f) => &f.namespace,
            Self::Request(f) => &f.namespace,
            Self::Resolve(f) => &f.namespace,
            Self::Reject(f) => &f.namespace,
            Self::BadPacket(f) => &f.namespace,
        }
    }

    pub fn encode(&self) -> Bytes {
        match self {
            Self::Packet(f) => f.encode(),
            Self::Request(f) => f.encode(),
            Self::Resolve(f) => f.encode(),
            Self::Reject(f) => f.encode(),
            Self::BadPacket(f) => f.encode(),
        }
    }

    pub fn decode(bytes: impl Into<Bytes>) -> ProtocolResult<Self> {
        let mut reader = PayloadReader::new(bytes);
        let FrameHeader { kind, namespace } = FrameHeader::read_from(&mut reader)?;
        let frame = match kind {
            FrameKind::Packet => Self::Packet(Envelope::read_body(namespace, &mut reader)?),
            FrameKind::Request => {
                Self::Request(RequestEnvelope::read_body(namespace, &mut reader)?)
            }
            FrameKind::Resolve => {
                Self::Resolve(ResolveEnvelope::read_body(namespace, &mut reader)?)
            }
            FrameKind::Reject => Self::Reject(RejectEnvelope::read_body(namespace, &mut reader)?),
            FrameKind::BadPacket => {
                Self::BadPacket(BadPacketNotice::read_body(namespace, &mut reader)?)
            }
        };
        Ok(frame)
    }
}

/// Encodes a one-shot packet frame.
pub fn encode_envelope(namespace: &str, name: &str, payload: &[u8]) -> Bytes {
    let mut writer =
        PayloadWriter::with_capacity(1 + 8 + namespace.len() + name.len() + payload.len());
    FrameHeader::write_to(FrameKind::Packet, namespace, &mut writer);
    writer.write_str(name).write_raw(payload);
    writer.freeze()
}

/// Decodes a one-shot packet frame into namespace, handler name and a reader
/// positioned at the payload.
pub fn decode_envelope(bytes: impl Into<Bytes>) -> ProtocolResult<(String, String, PayloadReader)> {
    let mut reader = PayloadReader::new(bytes);
    let header = FrameHeader::read_from(&mut reader)?;
    if header.kind != FrameKind::Packet {
        return Err(ProtocolError::UnexpectedFrameKind {
            expected: FrameKind::Packet,
            found: header.kind,
        });
    }
    let name = reader.read_string()?;
    Ok((header.namespace, name, reader))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }

    #[test]
    fn packet_wire_layout() {
        let bytes = encode_envelope("pkg.a", "ping", &[0x01, 0x02]);
        insta::assert_snapshot!(hex(&bytes), @"0105000000706b672e610400000070696e670102");
    }

    #[test]
    fn request_wire_layout() {
        let frame = RequestEnvelope {
            namespace: "pkg.a".into(),
            name: "ping".into(),
            request_id: 7,
            payload: Bytes::from_static(&[0x01, 0x02]),
        };
        insta::assert_snapshot!(
            hex(&frame.encode()),
            @"0205000000706b672e610400000070696e6707000000020000000102"
        );
    }

    #[test]
    fn envelope_roundtrip_with_empty_strings() {
        for (namespace, name, payload) in [
            ("", "", &b""[..]),
            ("pkg.a", "", &b"x"[..]),
            ("", "ping", &b"\x00\x01"[..]),
            ("ünï.cödé", "名前", &b"payload"[..]),
        ] {
            let bytes = encode_envelope(namespace, name, payload);
            let (ns, n, mut reader) = decode_envelope(bytes).unwrap();
            assert_eq!(ns, namespace);
            assert_eq!(n, name);
            assert_eq!(&reader.read_remaining()[..], payload);
        }
    }

    #[test]
    fn request_payload_ignores_trailing_slack() {
        let frame = RequestEnvelope {
            namespace: "pkg.a".into(),
            name: "ping".into(),
            request_id: 3,
            payload: Bytes::from_static(b"abc"),
        };
        let mut bytes = frame.encode().to_vec();
        bytes.extend_from_slice(&[0xde, 0xad]);

        let decoded = Frame::decode(bytes).unwrap();
        assert_eq!(decoded, Frame::Request(frame));
    }

    #[test]
    fn every_kind_decodes_back() {
        let frames = vec![
            Frame::Packet(Envelope::new("ns", "tick", Bytes::from_static(b"t"))),
            Frame::Resolve(ResolveEnvelope {
                namespace: "ns".into(),
                request_id: i32::MAX,
                payload: Bytes::new(),
            }),
            Frame::Reject(RejectEnvelope {
                namespace: "ns".into(),
                request_id: -5,
                rejection: Rejection::custom("nope"),
            }),
            Frame::BadPacket(BadPacketNotice {
                namespace: "ns".into(),
                name: Some("tick".into()),
            }),
            Frame::BadPacket(BadPacketNotice {
                namespace: "other".into(),
                name: None,
            }),
        ];
        for frame in frames {
            let decoded = Frame::decode(frame.encode()).unwrap();
            assert_eq!(decoded.kind(), frame.kind());
            assert_eq!(decoded, frame);
        }
    }

    #[test]
    fn header_then_incremental_body() {
        let bytes = RejectEnvelope {
            namespace: "pkg.a".into(),
            request_id: 11,
            rejection: Rejection::InternalFailure,
        }
        .encode();

        let mut reader = PayloadReader::new(bytes);
        let header = FrameHeader::read_from(&mut reader).unwrap();
        assert_eq!(header.kind, FrameKind::Reject);
        assert_eq!(header.namespace, "pkg.a");
        assert_eq!(reader.read_i32().unwrap(), 11);
        assert_eq!(
            Rejection::read_from(&mut reader).unwrap(),
            Rejection::InternalFailure
        );
    }

    #[test]
    fn unknown_kind() {
        assert!(matches!(
            Frame::decode(vec![0x7f, 0, 0, 0, 0]),
            Err(ProtocolError::UnknownFrameKind(0x7f))
        ));
    }

    #[test]
    fn decode_envelope_rejects_other_kinds() {
        let bytes = BadPacketNotice {
            namespace: "ns".into(),
            name: None,
        }
        .encode();
        assert!(matches!(
            decode_envelope(bytes),
            Err(ProtocolError::UnexpectedFrameKind {
                expected: FrameKind::Packet,
                found: FrameKind::BadPacket
            })
        ));
    }

    #[test]
    fn bad_packet_display() {
        let with_name = BadPacketNotice {
            namespace: "pkg.a".into(),
            name: Some("tick".into()),
        };
        assert_eq!(
            with_name.to_string(),
            "peer has no packet handler `tick` in namespace `pkg.a`"
        );
        let without = BadPacketNotice {
            namespace: "pkg.a".into(),
            name: None,
        };
        assert_eq!(without.to_string(), "peer does not know namespace `pkg.a`");
    }
}
