//! Length-prefixed message frames.
//!
//! Every message travels as `u32` little-endian payload length followed by
//! the payload itself. The length prefix does not count its own four bytes.
//! Oversized frames are rejected on both sides; a peer that sends one is
//! protocol-broken and gets disconnected by the caller.

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Upper bound on a frame payload. A full `SET_CHUNK` is ~13 KiB plus the
/// type table, so this leaves generous headroom for payload-carrying types.
pub const MAX_FRAME_LEN: u32 = 1_048_576;

/// Errors surfaced by the framing layer.
#[derive(Debug, Error)]
pub enum FrameError {
    /// A frame length exceeded [`MAX_FRAME_LEN`].
    #[error("frame of {len} bytes exceeds the {max}-byte limit")]
    TooLarge {
        len: u32,
        max: u32,
    },

    /// The peer closed the connection mid-frame (or cleanly between frames).
    #[error("connection closed")]
    Closed,

    /// Transport I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reads one frame, blocking until it is complete.
pub async fn read_frame<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<Vec<u8>, FrameError> {
    let mut len_bytes = [0u8; 4];
    match reader.read_exact(&mut len_bytes).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Err(FrameError::Closed),
        Err(e) => return Err(FrameError::Io(e)),
    }

    let len = u32::from_le_bytes(len_bytes);
    if len > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge {
            len,
            max: MAX_FRAME_LEN,
        });
    }

    let mut payload = vec![0u8; len as usize];
    if len > 0 {
        reader.read_exact(&mut payload).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                FrameError::Closed
            } else {
                FrameError::Io(e)
            }
        })?;
    }
    Ok(payload)
}

/// Writes one frame and flushes.
pub async fn write_frame<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    payload: &[u8],
) -> Result<(), FrameError> {
    let len = payload.len() as u32;
    if len > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge {
            len,
            max: MAX_FRAME_LEN,
        });
    }
    writer.write_all(&len.to_le_bytes()).await?;
    if !payload.is_empty() {
        writer.write_all(payload).await?;
    }
    writer.flush().await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
