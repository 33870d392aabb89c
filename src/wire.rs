//! Length-prefixed bincode framing shared by the client socket, the
//! participant channels, and the mock participants in tests.
//!
//! Frames are a 4-byte little-endian length followed by a bincode payload.

use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a single framed message.
pub const MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

/// Encode a message to bytes with length prefix.
pub fn encode_message<T: Serialize>(msg: &T) -> Result<Vec<u8>> {
    let payload = bincode::serialize(msg)?;
    if payload.len() > MAX_MESSAGE_SIZE {
        anyhow::bail!("message too large: {} bytes", payload.len());
    }
    let len = (payload.len() as u32).to_le_bytes();
    let mut buf = Vec::with_capacity(4 + payload.len());
    buf.extend_from_slice(&len);
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Decode a message from bytes (after the length prefix has been stripped).
pub fn decode_message<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    Ok(bincode::deserialize(data)?)
}

/// Read one frame. Returns `Ok(None)` on clean EOF before the length prefix.
pub async fn read_frame<S>(stream: &mut S) -> std::io::Result<Option<Vec<u8>>>
where
    S: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match stream.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let msg_len = u32::from_le_bytes(len_buf) as usize;
    if msg_len > MAX_MESSAGE_SIZE {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("frame too large: {msg_len} bytes"),
        ));
    }

    let mut payload = vec![0u8; msg_len];
    stream.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

/// Write one already-encoded frame and flush.
pub async fn write_frame<S>(stream: &mut S, frame: &[u8]) -> std::io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(frame).await?;
    stream.flush().await
}
