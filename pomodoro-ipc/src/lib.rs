//! Inter-process communication between a `pom` invocation and the resident
//! pomodoro process.
//!
//! One JSON object per line over a Unix domain socket: the client writes a
//! single [`IpcRequest`] line and reads back a single [`IpcResponse`] line.
//! The resident serves one connection at a time.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub mod client;

pub use client::{forward, send};

/// Well-known name of the resident's channel.
pub const CHANNEL_NAME: &str = "pomodoro.pom";

/// How long a client waits for the resident to accept a connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_millis(150);

/// How long the resident waits for its control loop to finish a command.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(2);

/// Delivery attempts made by a secondary invocation.
pub const FORWARD_ATTEMPTS: u32 = 20;

/// Pause between delivery attempts.
pub const FORWARD_DELAY: Duration = Duration::from_millis(100);

/// Backoff after a failed accept.
pub const ACCEPT_BACKOFF: Duration = Duration::from_millis(250);

/// Socket path for the channel inside `runtime_dir`.
pub fn socket_path_in(runtime_dir: &Path) -> PathBuf {
    runtime_dir.join(format!("{CHANNEL_NAME}.sock"))
}

/// A command sent to the resident.
///
/// `Options` maps flag names (including the leading `--`) to an optional
/// value; `Positionals` carries bare arguments in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IpcRequest {
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub options: Option<BTreeMap<String, Option<String>>>,
    #[serde(default)]
    pub positionals: Option<Vec<String>>,
}

impl IpcRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            options: None,
            positionals: None,
        }
    }

    pub fn with_options(mut self, options: BTreeMap<String, Option<String>>) -> Self {
        self.options = Some(options);
        self
    }

    pub fn with_positionals(mut self, positionals: Vec<String>) -> Self {
        self.positionals = Some(positionals);
        self
    }

    /// Flag lookup, case-insensitive on the flag name.
    ///
    /// Returns `Some(None)` for a flag given without a value.
    pub fn option(&self, name: &str) -> Option<Option<&str>> {
        self.options.as_ref().and_then(|options| {
            options
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value.as_deref())
        })
    }

    pub fn has_flag(&self, name: &str) -> bool {
        self.option(name).is_some()
    }

    pub fn positionals(&self) -> &[String] {
        self.positionals.as_deref().unwrap_or(&[])
    }
}

/// The resident's answer to an [`IpcRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IpcResponse {
    pub ok: bool,
    pub message: String,
    #[serde(default)]
    pub payload: Option<String>,
}

impl IpcResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
            payload: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }
}

#[derive(Error, Debug)]
pub enum IpcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not running.")]
    NotRunning,

    #[error("Timed out waiting for a response.")]
    TimedOut,

    #[error("No response.")]
    EmptyResponse,
}

/// Serialize a message to one JSON line, newline included.
pub fn encode_line<T: Serialize>(msg: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut bytes = serde_json::to_vec(msg)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Parse one JSON line, ignoring the trailing line terminator.
pub fn decode_line<T: DeserializeOwned>(line: &str) -> Result<T, serde_json::Error> {
    serde_json::from_str(line.trim_end_matches(&['\r', '\n'][..]))
}
