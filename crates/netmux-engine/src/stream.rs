//! Outbound queue plumbing shared by both ends of a stream connection.
//!
//! Transports push frames into a bounded queue without blocking; a writer
//! task drains the queue onto the socket with length-prefixed framing.

use std::time::Duration;

use bytes::Bytes;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use netmux_protocol::{FrameWriter, MAX_FRAME_SIZE, ProtocolError};

use crate::transport::{DeliveryMode, Peer, TransportError, TransportResult};

/// Queues `frame` for `target`.
///
/// A full queue drops unreliable frames silently and fails reliable ones.
pub fn enqueue(
    queue: &mpsc::Sender<Bytes>,
    target: Peer,
    frame: Bytes,
    mode: DeliveryMode,
) -> TransportResult<()> {
    if frame.len() > MAX_FRAME_SIZE as usize {
        return Err(ProtocolError::FrameTooLarge {
            size: u32::try_from(frame.len()).unwrap_or(u32::MAX),
            max: MAX_FRAME_SIZE,
        }
        .into());
    }

    match queue.try_send(frame) {
        Ok(()) => Ok(()),
        Err(mpsc::error::TrySendError::Full(_)) if !mode.is_reliable() => {
            debug!(peer = %target, ?mode, "Outbound queue full, dropping frame");
            Ok(())
        }
        Err(mpsc::error::TrySendError::Full(_)) => Err(TransportError::QueueFull(target)),
        Err(mpsc::error::TrySendError::Closed(_)) => Err(TransportError::Closed(target)),
    }
}

/// Writes queued frames to `writer` until the queue closes or a write fails.
///
/// Each frame must be written within `write_timeout`.
pub async fn write_frames<W>(
    peer: Peer,
    writer: W,
    mut outbound: mpsc::Receiver<Bytes>,
    write_timeout: Duration,
) where
    W: AsyncWrite + Unpin,
{
    let mut writer = FrameWriter::new(writer);
    while let Some(frame) = outbound.recv().await {
        let written = tokio::time::timeout(write_timeout, async {
            writer.write_frame(&frame).await?;
            writer.flush().await
        })
        .await;

        match written {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(%peer, error = %e, "Failed to write frame");
                break;
            }
            Err(_) => {
                warn!(%peer, timeout = ?write_timeout, "Timed out writing frame");
                break;
            }
        }
    }
    debug!(%peer, "Writer stopped");
}
