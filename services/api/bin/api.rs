//! Main Entrypoint for the GeoVoice API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Constructing the Axum router and applying CORS.
//! 3. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use axum::http::HeaderValue;
use geovoice_api::{config::Config, router::create_router, state::AppState};
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info, warn};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(
            origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok()),
        )
    };
    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    if config.openai_api_key.is_none() {
        warn!("OPENAI_API_KEY is not set; session requests will fail until it is configured.");
    }

    // --- 3. Create Router and Apply Middleware ---
    let cors = cors_layer(&config.cors_origins);
    let bind_address = config.bind_address;
    info!(
        model = %config.realtime_model,
        upstream = %config.openai_base_url,
        bind_address = %bind_address,
        "Service configured. Starting server..."
    );
    let app = create_router(Arc::new(AppState::new(config))).layer(cors);

    // --- 4. Start Server ---
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
