//! hlsvod - On-demand HLS transcoding
//!
//! This library crate exposes the session engine, configuration and HTTP
//! surface for the binary and for integration testing.

pub mod config;
pub mod server;
pub mod session;
pub mod watch;
