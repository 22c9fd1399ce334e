//! API Models
//!
//! Request and response bodies of the token endpoint, plus the parts of the
//! upstream session response we read. The public types derive `ToSchema` for
//! the OpenAPI document.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Optional overrides for the realtime session. Absent fields use the server defaults.
#[derive(Deserialize, ToSchema, Debug, Default)]
pub struct CreateSessionRequest {
    #[schema(example = "gpt-realtime")]
    #[serde(default)]
    pub model: Option<String>,
    #[schema(example = "alloy")]
    #[serde(default)]
    pub voice: Option<String>,
}

/// A short-lived credential for one realtime session.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct RealtimeSessionResponse {
    #[schema(example = "ek_68af...")]
    pub token: String,
    /// Unix seconds; 0 when upstream did not say.
    pub expires_at: i64,
    #[schema(example = "https://api.openai.com/v1/realtime")]
    pub realtime_url: String,
    pub model: String,
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "ok")]
    pub status: String,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}

#[derive(Serialize, Debug)]
pub struct UpstreamSessionRequest<'a> {
    pub model: &'a str,
    pub voice: &'a str,
}

#[derive(Deserialize, Debug)]
pub struct UpstreamClientSecret {
    pub value: String,
    #[serde(default)]
    pub expires_at: Option<i64>,
}

#[derive(Deserialize, Debug)]
pub struct UpstreamSession {
    pub client_secret: UpstreamClientSecret,
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub model: Option<String>,
}

impl UpstreamSession {
    /// The token response for a session created against `base_url`.
    pub fn into_response(self, base_url: &str, requested_model: &str) -> RealtimeSessionResponse {
        RealtimeSessionResponse {
            token: self.client_secret.value,
            expires_at: self
                .client_secret
                .expires_at
                .or(self.expires_at)
                .unwrap_or(0),
            realtime_url: format!("{}/v1/realtime", base_url.trim_end_matches('/')),
            model: self.model.unwrap_or_else(|| requested_model.to_string()),
        }
    }
}
