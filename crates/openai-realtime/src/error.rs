use thiserror::Error;

/// Failures that end a connection attempt or an established session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("microphone unavailable: {0}")]
    PermissionDenied(String),
    #[error("could not obtain a session credential: {0}")]
    CredentialError(String),
    #[error("transport negotiation failed: {0}")]
    NegotiationFailed(String),
    #[error("connection lost: {0}")]
    ConnectionLost(String),
    #[error("connection attempt superseded by a disconnect or a newer attempt")]
    Superseded,
}

impl TransportError {
    /// A short hint shown next to the error status.
    pub fn guidance(&self) -> &'static str {
        match self {
            Self::PermissionDenied(_) => {
                "Allow microphone access for this application, then connect again."
            }
            Self::CredentialError(_) => "Check that the backend is running, then connect again.",
            Self::NegotiationFailed(_) | Self::ConnectionLost(_) | Self::Superseded => {
                "Connect again to retry."
            }
        }
    }
}
