//! Axum Handlers for the REST API
//!
//! The token endpoint forwards one request to the realtime provider using the
//! server-held key and returns only the ephemeral secret. `utoipa` doc
//! comments generate the OpenAPI documentation.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::{
    models::{
        CreateSessionRequest, ErrorResponse, HealthResponse, RealtimeSessionResponse,
        UpstreamSession, UpstreamSessionRequest,
    },
    state::AppState,
};

#[derive(Debug)]
pub enum ApiError {
    /// The server is missing configuration it needs for this request.
    NotConfigured(String),
    /// The realtime provider was unreachable or refused the request.
    BadGateway(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotConfigured(message) => {
                error!("{}", message);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
            ApiError::BadGateway(message) => {
                warn!("{}", message);
                (StatusCode::BAD_GATEWAY, Json(ErrorResponse { message })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

/// Create an ephemeral token for one realtime voice session.
#[utoipa::path(
    post,
    path = "/api/realtime/session",
    request_body(content = CreateSessionRequest, description = "Optional model and voice overrides"),
    responses(
        (status = 200, description = "Session token issued", body = RealtimeSessionResponse),
        (status = 500, description = "API key not configured on the server", body = ErrorResponse),
        (status = 502, description = "The realtime provider failed", body = ErrorResponse)
    )
)]
#[instrument(skip_all)]
pub async fn create_realtime_session(
    State(state): State<Arc<AppState>>,
    payload: Option<Json<CreateSessionRequest>>,
) -> Result<Json<RealtimeSessionResponse>, ApiError> {
    let config = &state.config;
    let api_key = config.openai_api_key.as_deref().ok_or_else(|| {
        ApiError::NotConfigured("OPENAI_API_KEY not configured on server".to_string())
    })?;

    let request = payload.map(|Json(p)| p).unwrap_or_default();
    let model = request.model.unwrap_or_else(|| config.realtime_model.clone());
    let voice = request.voice.unwrap_or_else(|| config.realtime_voice.clone());

    let response = state
        .http
        .post(format!("{}/v1/realtime/sessions", config.openai_base_url))
        .bearer_auth(api_key)
        .json(&UpstreamSessionRequest {
            model: &model,
            voice: &voice,
        })
        .send()
        .await
        .map_err(|e| ApiError::BadGateway(format!("Failed to connect to OpenAI API: {}", e)))?;

    let status = response.status();
    if status != StatusCode::OK {
        let body = response.text().await.unwrap_or_default();
        return Err(ApiError::BadGateway(format!(
            "OpenAI API error ({}): {}",
            status.as_u16(),
            body
        )));
    }

    let upstream: UpstreamSession = response.json().await.map_err(|e| {
        ApiError::BadGateway(format!("Unexpected OpenAI API response: {}", e))
    })?;
    let session = upstream.into_response(&config.openai_base_url, &model);
    info!(model = %session.model, %voice, expires_at = session.expires_at, "Issued realtime session token");
    Ok(Json(session))
}

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is running", body = HealthResponse)
    )
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}
