//! Realtime transport to the voice agent.
//!
//! [`TransportSession`] owns one connection at a time: the microphone and
//! speaker ([`audio`]), a short-lived credential from the trusted backend
//! ([`credential`]), and the negotiated data channel ([`negotiate`]).

pub mod audio;
pub mod credential;
pub mod error;
pub mod negotiate;
pub mod pcm;
pub mod session;

pub use audio::{AudioDevices, AudioHandle, CpalAudioDevices};
pub use credential::{BackendCredentialSource, CredentialSource, EphemeralCredential};
pub use error::TransportError;
pub use negotiate::{NegotiatedLink, Negotiator, WebSocketNegotiator};
pub use session::{ConnectionStatus, TransportSession, TransportSettings};
