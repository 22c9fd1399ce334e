//! GeoVoice API Library Crate
//!
//! The trusted backend for the voice client. It holds the long-lived realtime
//! API key and hands out short-lived session tokens, so the key never leaves
//! the server. The binaries in `bin/` are thin wrappers around this library.

pub mod config;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
