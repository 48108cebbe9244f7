use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::tasklist::errors::TaskListError;

/// Read a single JSONL message from an async buffered reader.
///
/// Returns `Ok(None)` when the stream is closed (EOF).
pub async fn read_message<R, T>(reader: &mut R) -> Result<Option<T>, TaskListError>
where
    R: AsyncBufRead + Unpin,
    T: DeserializeOwned,
{
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Ok(None);
    }

    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    serde_json::from_str(trimmed)
        .map(Some)
        .map_err(|e| TaskListError::Protocol(format!("invalid JSON: {}: {}", e, trimmed)))
}

/// Write one message as compact JSON plus newline, then flush.
pub async fn write_message<W, T>(writer: &mut W, msg: &T) -> Result<(), TaskListError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let json = serde_json::to_string(msg)?;
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}
