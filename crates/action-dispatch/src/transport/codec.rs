//! Length-prefixed JSON framing.
//!
//! Every frame on the wire is a 4-byte big-endian length followed by that many
//! bytes of JSON:
//!
//! ```text
//! ┌──────────────┬──────────────────────────────────────────────┐
//! │ len: u32 BE  │ {"type":"request","id":1,"message":{...}}    │
//! └──────────────┴──────────────────────────────────────────────┘
//! ```
//!
//! Replies carry the full `Result<Value, DispatchError>`, so a `NoMatch` raised by
//! the listener's dispatcher arrives at the caller as the same variant.

use crate::error::{DispatchError, Result};
use crate::message::Message;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// One unit of the request/reply protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    Request {
        id: u64,
        message: Message,
    },
    Reply {
        id: u64,
        outcome: std::result::Result<Value, DispatchError>,
    },
}

impl Frame {
    pub fn id(&self) -> u64 {
        match self {
            Frame::Request { id, .. } | Frame::Reply { id, .. } => *id,
        }
    }
}

/// Serializes `frame` with its length prefix, without touching any stream.
pub fn encode_frame(frame: &Frame, max_size: usize) -> Result<Vec<u8>> {
    let body = serde_json::to_vec(frame)?;
    if body.len() > max_size {
        return Err(DispatchError::Transport(format!(
            "frame size {} exceeds maximum {}",
            body.len(),
            max_size
        )));
    }

    let mut buf = Vec::with_capacity(4 + body.len());
    buf.extend_from_slice(&(body.len() as u32).to_be_bytes());
    buf.extend_from_slice(&body);
    Ok(buf)
}

/// Writes bytes produced by [`encode_frame`].
pub async fn write_encoded<W>(writer: &mut W, buf: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer
        .write_all(buf)
        .await
        .map_err(|e| DispatchError::Transport(format!("failed to write frame: {e}")))?;
    writer
        .flush()
        .await
        .map_err(|e| DispatchError::Transport(format!("failed to flush frame: {e}")))
}

/// Serializes `frame` and writes it with its length prefix.
pub async fn write_frame<W>(writer: &mut W, frame: &Frame, max_size: usize) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let buf = encode_frame(frame, max_size)?;
    write_encoded(writer, &buf).await?;
    debug!(id = frame.id(), bytes = buf.len() - 4, "Sent frame");
    Ok(())
}

/// Reads one frame. Returns `Ok(None)` when the peer closed the stream cleanly
/// between frames.
pub async fn read_frame<R>(reader: &mut R, max_size: usize) -> Result<Option<Frame>>
where
    R: AsyncRead + Unpin,
{
    let mut len_bytes = [0u8; 4];
    match reader.read_exact(&mut len_bytes).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => {
            return Err(DispatchError::Transport(format!(
                "failed to read frame length: {e}"
            )))
        }
    }

    let len = u32::from_be_bytes(len_bytes) as usize;
    if len > max_size {
        return Err(DispatchError::Transport(format!(
            "frame size {len} exceeds maximum {max_size}"
        )));
    }

    let mut body = vec![0u8; len];
    reader
        .read_exact(&mut body)
        .await
        .map_err(|e| DispatchError::Transport(format!("failed to read frame body: {e}")))?;

    let frame: Frame = serde_json::from_slice(&body)?;
    debug!(id = frame.id(), bytes = len, "Received frame");
    Ok(Some(frame))
}
