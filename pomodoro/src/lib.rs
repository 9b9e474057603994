//! Pomodoro sessions with a single resident process.
//!
//! The resident owns the live session and serves commands from short-lived
//! `pom` invocations over a Unix domain socket. Session state, config,
//! intents and an audit log live as files in the data directory.

pub mod app;
pub mod cli;
pub mod config;
pub mod daemon;
pub mod instance;
pub mod intent;
pub mod ipc;
pub mod logging;
pub mod notify;
pub mod persistence;
pub mod session;
pub mod ui;
