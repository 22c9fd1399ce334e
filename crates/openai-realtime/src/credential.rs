//! Short-lived access credentials issued by the trusted backend.
//!
//! The client never holds the long-lived API key. Each `connect()` asks the
//! backend for an ephemeral token scoped to one realtime session.

use crate::error::TransportError;
use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

#[derive(Debug, Clone)]
pub struct EphemeralCredential {
    pub token: SecretString,
    /// Unix seconds.
    pub expires_at: i64,
    /// Base URL of the realtime endpoint, e.g. `https://api.openai.com/v1/realtime`.
    pub realtime_url: String,
    pub model: String,
}

#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn fetch(&self) -> Result<EphemeralCredential, TransportError>;
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    model: &'a str,
    voice: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
    expires_at: i64,
    realtime_url: String,
    model: String,
}

impl From<TokenResponse> for EphemeralCredential {
    fn from(r: TokenResponse) -> Self {
        Self {
            token: SecretString::from(r.token),
            expires_at: r.expires_at,
            realtime_url: r.realtime_url,
            model: r.model,
        }
    }
}

/// Fetches credentials from `POST {backend}/api/realtime/session`.
pub struct BackendCredentialSource {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    voice: String,
}

impl BackendCredentialSource {
    pub fn new(backend_url: &str, model: impl Into<String>, voice: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: format!("{}/api/realtime/session", backend_url.trim_end_matches('/')),
            model: model.into(),
            voice: voice.into(),
        }
    }
}

#[async_trait]
impl CredentialSource for BackendCredentialSource {
    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn fetch(&self) -> Result<EphemeralCredential, TransportError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&TokenRequest {
                model: &self.model,
                voice: &self.voice,
            })
            .send()
            .await
            .map_err(|e| TransportError::CredentialError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::CredentialError(format!(
                "backend returned {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| TransportError::CredentialError(format!("malformed token response: {}", e)))?;
        if token.token.is_empty() {
            return Err(TransportError::CredentialError(
                "backend returned an empty token".to_string(),
            ));
        }
        debug!(expires_at = token.expires_at, model = %token.model, "Obtained ephemeral credential");
        Ok(token.into())
    }
}
