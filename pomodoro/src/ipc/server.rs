//! Unix domain socket server for IPC.
//!
//! Connections are served one at a time. Each request is parsed here and,
//! if well formed, handed to the control loop, which owns all state.

use crate::daemon::{call, ControlRequest};
use anyhow::Result;
use pomodoro_ipc::{decode_line, encode_line, IpcRequest, IpcResponse, ACCEPT_BACKOFF, COMMAND_TIMEOUT};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

/// How long a connected client has to send its request line.
const READ_TIMEOUT: Duration = Duration::from_secs(2);

/// Accept connections until `shutdown` turns true.
pub async fn serve(
    listener: UnixListener,
    control: mpsc::Sender<ControlRequest>,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("IPC server listening");
    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    if let Err(e) = handle_client(stream, &control).await {
                        warn!("Error handling client: {:#}", e);
                    }
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    sleep(ACCEPT_BACKOFF).await;
                }
            },
        }
    }
    info!("IPC server stopped");
}

async fn handle_client(stream: UnixStream, control: &mpsc::Sender<ControlRequest>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    let response = match timeout(READ_TIMEOUT, reader.read_line(&mut line)).await {
        Err(_) => IpcResponse::failure("Timed out reading request."),
        Ok(Err(e)) => return Err(e.into()),
        Ok(Ok(_)) => match parse_request(&line) {
            Ok(request) => {
                debug!(command = %request.command, "request received");
                call(control, request, COMMAND_TIMEOUT).await
            }
            Err(rejected) => rejected,
        },
    };

    writer.write_all(&encode_line(&response)?).await?;
    writer.flush().await?;
    Ok(())
}

/// Validate one request line. Rejections are answered without involving the
/// control loop.
pub fn parse_request(line: &str) -> Result<IpcRequest, IpcResponse> {
    if line.trim().is_empty() {
        return Err(IpcResponse::failure("Empty request."));
    }
    let request: IpcRequest =
        decode_line(line).map_err(|_| IpcResponse::failure("Invalid JSON request."))?;
    if request.command.trim().is_empty() {
        return Err(IpcResponse::failure("Missing command."));
    }
    Ok(request)
}
