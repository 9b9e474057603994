//! Resident side of the local channel.

pub mod server;

pub use server::{parse_request, serve};
