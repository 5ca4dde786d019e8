//! Length-prefixed framing for stream transports.
//!
//! Datagram transports deliver frames as-is. Stream transports (the Unix
//! socket server and client) wrap each frame with a 4-byte big-endian length:
//!
//! ```text
//! +----------------+------------------+
//! | length (4 BE)  |  frame bytes     |
//! +----------------+------------------+
//! ```

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::MAX_FRAME_SIZE;
use crate::error::{ProtocolError, ProtocolResult};

fn check_len(len: usize) -> ProtocolResult<u32> {
    match u32::try_from(len) {
        Ok(len) if len <= MAX_FRAME_SIZE => Ok(len),
        _ => Err(ProtocolError::FrameTooLarge {
            size: u32::try_from(len).unwrap_or(u32::MAX),
            max: MAX_FRAME_SIZE,
        }),
    }
}

/// Prepends the length prefix to a frame.
pub fn encode_frame(frame: &[u8]) -> ProtocolResult<Vec<u8>> {
    let len = check_len(frame.len())?;
    if len == 0 {
        return Err(ProtocolError::EmptyFrame);
    }

    let mut buffer = Vec::with_capacity(4 + frame.len());
    buffer.extend_from_slice(&len.to_be_bytes());
    buffer.extend_from_slice(frame);
    Ok(buffer)
}

/// Splits one length-prefixed frame off the front of `data`.
///
/// Returns `Ok(None)` when `data` does not yet hold a complete frame.
pub fn decode_frame(data: &mut BytesMut) -> ProtocolResult<Option<Bytes>> {
    if data.len() < 4 {
        return Ok(None);
    }

    let len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
    if len > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: len,
            max: MAX_FRAME_SIZE,
        });
    }
    if len == 0 {
        return Err(ProtocolError::EmptyFrame);
    }

    let len = len as usize;
    if data.len() < 4 + len {
        return Ok(None);
    }

    let mut frame = data.split_to(4 + len);
    let _ = frame.split_to(4);
    Ok(Some(frame.freeze()))
}

/// Reads framed messages from an async byte stream.
pub struct FrameReader<R> {
    reader: R,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Creates a new FrameReader wrapping the given reader.
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Reads a single frame.
    ///
    /// Returns `Ok(None)` if the stream ends cleanly between frames. Ending
    /// inside the length prefix is a truncation error.
    pub async fn read_frame(&mut self) -> ProtocolResult<Option<Bytes>> {
        let mut len_buf = [0u8; 4];
        let mut filled = 0;
        while filled < len_buf.len() {
            match self.reader.read(&mut len_buf[filled..]).await? {
                0 if filled == 0 => return Ok(None),
                0 => {
                    return Err(ProtocolError::Truncated {
                        needed: len_buf.len(),
                        remaining: filled,
                    });
                }
                n => filled += n,
            }
        }

        let len = u32::from_be_bytes(len_buf);
        if len > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: len,
                max: MAX_FRAME_SIZE,
            });
        }
        if len == 0 {
            return Err(ProtocolError::EmptyFrame);
        }

        let mut payload = vec![0u8; len as usize];
        self.reader.read_exact(&mut payload).await?;
        Ok(Some(Bytes::from(payload)))
    }

    /// Unwraps this FrameReader, returning the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

/// Writes framed messages to an async byte stream.
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Creates a new FrameWriter wrapping the given writer.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes a single frame. Does not flush.
    pub async fn write_frame(&mut self, frame: &[u8]) -> ProtocolResult<()> {
        let data = encode_frame(frame)?;
        self.writer.write_all(&data).await?;
        Ok(())
    }

    /// Flushes the underlying writer.
    pub async fn flush(&mut self) -> ProtocolResult<()> {
        self.writer.flush().await?;
        Ok(())
    }

    /// Unwraps this FrameWriter, returning the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode_envelope;
    use std::io::Cursor;

    #[test]
    fn encode_prefixes_length() {
        let frame = encode_envelope("ns", "name", b"data");
        let bytes = encode_frame(&frame).unwrap();
        let len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        assert_eq!(len as usize, frame.len());
        assert_eq!(&bytes[4..], &frame[..]);
    }

    #[test]
    fn encode_rejects_empty() {
        assert!(matches!(encode_frame(&[]), Err(ProtocolError::EmptyFrame)));
    }

    #[test]
    fn decode_waits_for_full_frame() {
        let bytes = encode_frame(b"hello").unwrap();
        let mut buf = BytesMut::from(&bytes[..6]);
        assert!(decode_frame(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&bytes[6..]);
        buf.extend_from_slice(&encode_frame(b"x").unwrap());
        assert_eq!(&decode_frame(&mut buf).unwrap().unwrap()[..], b"hello");
        assert_eq!(&decode_frame(&mut buf).unwrap().unwrap()[..], b"x");
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_rejects_oversized() {
        let mut buf = BytesMut::from(&(MAX_FRAME_SIZE + 1).to_be_bytes()[..]);
        assert!(matches!(
            decode_frame(&mut buf),
            Err(ProtocolError::FrameTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn reader_writer_roundtrip() {
        let frames: Vec<&[u8]> = vec![b"one", b"two", b"three"];

        let mut buffer = Vec::new();
        {
            let mut writer = FrameWriter::new(&mut buffer);
            for frame in &frames {
                writer.write_frame(frame).await.unwrap();
            }
            writer.flush().await.unwrap();
        }

        let mut reader = FrameReader::new(Cursor::new(buffer));
        for expected in &frames {
            let actual = reader.read_frame().await.unwrap().unwrap();
            assert_eq!(&actual[..], *expected);
        }
        assert!(reader.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn eof_inside_length_prefix_is_truncation() {
        let mut bytes = encode_frame(b"hello").unwrap().to_vec();
        bytes.extend_from_slice(&[0, 0]);

        let mut reader = FrameReader::new(Cursor::new(bytes));
        assert_eq!(&reader.read_frame().await.unwrap().unwrap()[..], b"hello");
        assert!(matches!(
            reader.read_frame().await,
            Err(ProtocolError::Truncated {
                needed: 4,
                remaining: 2
            })
        ));
    }

    #[tokio::test]
    async fn eof_inside_frame_body_is_an_error() {
        let bytes = encode_frame(b"hello").unwrap();
        let mut reader = FrameReader::new(Cursor::new(bytes[..7].to_vec()));
        assert!(matches!(reader.read_frame().await, Err(ProtocolError::Io(_))));
    }

    #[tokio::test]
    async fn reader_empty_stream() {
        let mut reader = FrameReader::new(Cursor::new(Vec::new()));
        assert!(reader.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reader_zero_length_is_error() {
        let mut reader = FrameReader::new(Cursor::new(0u32.to_be_bytes().to_vec()));
        assert!(matches!(
            reader.read_frame().await,
            Err(ProtocolError::EmptyFrame)
        ));
    }
}
