//! Request-reply transport over TCP.
//!
//! Each message is one UTF-8 JSON document terminated by a newline. A channel
//! is strictly request/reply: the peer sends one request and waits for its
//! reply before sending the next.

pub mod client;
pub mod server;

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::models::Response;

pub use client::{ClientError, LibraryClient};
pub use server::Server;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("frame exceeds {0} bytes")]
    TooLarge(usize),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Read one frame, without its terminator.
///
/// Returns `Ok(None)` when the peer closed the connection before sending
/// anything. A final frame without a terminator is still returned.
pub async fn read_frame<R>(reader: &mut R, max_bytes: usize) -> Result<Option<Vec<u8>>, FrameError>
where
    R: AsyncBufRead + Unpin,
{
    let mut frame = Vec::new();
    let limit = u64::try_from(max_bytes).unwrap_or(u64::MAX).saturating_add(1);
    let read = (&mut *reader).take(limit).read_until(b'\n', &mut frame).await?;

    if read == 0 {
        return Ok(None);
    }

    if frame.last() == Some(&b'\n') {
        frame.pop();
        if frame.last() == Some(&b'\r') {
            frame.pop();
        }
    } else if frame.len() > max_bytes {
        return Err(FrameError::TooLarge(max_bytes));
    }

    Ok(Some(frame))
}

/// Write one frame followed by its terminator
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(payload).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

/// Encode a response for the wire
pub fn encode_response(response: &Response) -> Vec<u8> {
    serde_json::to_vec(response).unwrap_or_else(|e| {
        tracing::error!("Failed to encode response: {}", e);
        br#"{"success":false,"message":"Error interno"}"#.to_vec()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn test_read_frames() {
        let input: &[u8] = b"{\"a\":1}\n{\"b\":2}\r\nlast";
        let mut reader = BufReader::new(input);

        assert_eq!(read_frame(&mut reader, 64).await.unwrap().unwrap(), b"{\"a\":1}");
        assert_eq!(read_frame(&mut reader, 64).await.unwrap().unwrap(), b"{\"b\":2}");
        assert_eq!(read_frame(&mut reader, 64).await.unwrap().unwrap(), b"last");
        assert!(read_frame(&mut reader, 64).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_oversized_frame() {
        let input: &[u8] = b"0123456789\n";
        let mut reader = BufReader::new(input);

        assert!(matches!(
            read_frame(&mut reader, 4).await,
            Err(FrameError::TooLarge(4))
        ));
    }

    #[tokio::test]
    async fn test_frame_at_limit() {
        let input: &[u8] = b"0123\n";
        let mut reader = BufReader::new(input);
        assert_eq!(read_frame(&mut reader, 4).await.unwrap().unwrap(), b"0123");
    }

    #[tokio::test]
    async fn test_write_frame() {
        let mut output = Vec::new();
        write_frame(&mut output, b"{}").await.unwrap();
        assert_eq!(output, b"{}\n");
    }
}
