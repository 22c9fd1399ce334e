//! Wire types and codec for the realtime voice agent protocol.
//!
//! The remote agent speaks a JSON event protocol over a single data channel.
//! Every message carries a `type` discriminator. This crate holds:
//!
//! - [`client`]: events we send (session configuration, function results, turn triggers, audio).
//! - [`server`]: events we receive, as they appear on the wire.
//! - [`codec`]: the mapping from raw frames to typed [`ProtocolEvent`]s and back.

pub mod client;
pub mod codec;
pub mod server;

pub use codec::{
    CodecError, Inbound, ProtocolEvent, ToolInvocation, ToolResult, decode, encode, reply_sequence,
};
