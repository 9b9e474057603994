//! Tracing setup.
//!
//! Short-lived invocations log to stderr. The resident logs to a file in the
//! data directory so neither the terminal interface nor a detached process
//! writes log text to a terminal.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::IsTerminal;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Checked before `RUST_LOG`.
pub const LOG_ENV: &str = "POM_LOG";

fn filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(format!("pomodoro={0},pomodoro_ipc={0}", default_level)))
}

/// Warnings and errors on stderr.
pub fn init_cli() {
    let use_ansi = std::io::stderr().is_terminal();
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .with_ansi(use_ansi);

    // A second init (tests) is harmless.
    let _ = tracing_subscriber::registry()
        .with(filter("warn"))
        .with(fmt_layer)
        .try_init();
}

/// Append to `path`, `info` and above by default.
pub fn init_resident(path: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file: {}", path.display()))?;

    let fmt_layer = fmt::layer()
        .with_writer(Mutex::new(file))
        .with_target(false)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(filter("info"))
        .with(fmt_layer)
        .try_init()
        .context("Failed to initialize logging")?;
    Ok(())
}
