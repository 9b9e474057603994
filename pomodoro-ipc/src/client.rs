//! Client side of the channel, used by secondary invocations.

use crate::{decode_line, encode_line, IpcError, IpcRequest, IpcResponse, CONNECT_TIMEOUT};
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::time::{sleep, timeout};
use tracing::debug;

/// Upper bound on waiting for the response line. Longer than
/// [`crate::COMMAND_TIMEOUT`] so the resident's own "timed out" answer
/// arrives first.
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(3);

/// Send one request and read one response.
///
/// Connection failures of any kind (no socket, refused, connect timeout)
/// are reported as [`IpcError::NotRunning`].
pub async fn send(socket_path: &Path, request: &IpcRequest) -> Result<IpcResponse, IpcError> {
    let stream = match timeout(CONNECT_TIMEOUT, UnixStream::connect(socket_path)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            debug!("connect to {} failed: {}", socket_path.display(), e);
            return Err(IpcError::NotRunning);
        }
        Err(_) => return Err(IpcError::NotRunning),
    };

    let (reader, mut writer) = stream.into_split();
    writer.write_all(&encode_line(request)?).await?;
    writer.flush().await?;

    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    let read = timeout(RESPONSE_TIMEOUT, reader.read_line(&mut line))
        .await
        .map_err(|_| IpcError::TimedOut)??;

    if read == 0 || line.trim().is_empty() {
        return Err(IpcError::EmptyResponse);
    }

    Ok(decode_line(&line)?)
}

/// Deliver `request`, retrying while the resident is not accepting
/// connections yet.
///
/// Only [`IpcError::NotRunning`] is retried. Once a connection was made the
/// request may already have been applied, so other errors are returned
/// as-is.
pub async fn forward(
    socket_path: &Path,
    request: &IpcRequest,
    attempts: u32,
    delay: Duration,
) -> Result<IpcResponse, IpcError> {
    let mut last = IpcError::NotRunning;
    for attempt in 0..attempts.max(1) {
        if attempt > 0 {
            sleep(delay).await;
        }
        match send(socket_path, request).await {
            Ok(response) => return Ok(response),
            Err(IpcError::NotRunning) => {
                debug!("attempt {} for '{}': not running", attempt + 1, request.command);
                last = IpcError::NotRunning;
            }
            Err(e) => return Err(e),
        }
    }
    Err(last)
}
