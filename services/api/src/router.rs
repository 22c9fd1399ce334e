//! Axum Router Configuration
//!
//! Defines the HTTP routing for the token service and its OpenAPI
//! documentation.

use crate::{
    handlers,
    models::{CreateSessionRequest, ErrorResponse, HealthResponse, RealtimeSessionResponse},
    state::AppState,
};

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::create_realtime_session,
        handlers::health,
    ),
    components(
        schemas(CreateSessionRequest, RealtimeSessionResponse, HealthResponse, ErrorResponse)
    ),
    tags(
        (name = "GeoVoice API", description = "Ephemeral realtime session tokens for the voice map client")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route("/api/realtime/session", post(handlers::create_realtime_session))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(handlers::health))
        .merge(api_router)
}
