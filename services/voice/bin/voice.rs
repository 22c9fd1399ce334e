//! Main Entrypoint for the GeoVoice Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment and the command line.
//! 2. Building the map collaborators and the tool registry.
//! 3. Building the realtime transport (credentials, negotiation, audio).
//! 4. Running one voice session until `Ctrl+C`.

use anyhow::Context;
use clap::Parser;
use geovoice_core::geo::LngLat;
use geovoice_core::{Collaborators, MapTools, ObjectStore, ToolSettings};
use geovoice_voice::{
    agent,
    collaborators::{
        HttpExporter, HttpSegmenter, LoggingEvents, NominatimGeocoder, SimulatedMapView,
        ViewTimings, http_client,
    },
    config::Config,
    controller::{SessionController, SessionError},
};
use openai_realtime::{
    BackendCredentialSource, CpalAudioDevices, TransportSession, TransportSettings,
    WebSocketNegotiator,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "voice")]
#[command(about = "Talk to the map: a realtime voice session driving map tools", long_about = None)]
struct Args {
    /// Microphone to use (case-insensitive name fragment). Overrides INPUT_DEVICE.
    #[arg(long)]
    device: Option<String>,
    /// Directory exported shapefiles are written to. Overrides EXPORT_DIR.
    #[arg(long)]
    export_dir: Option<PathBuf>,
    /// Image used as the rendered map frame. Overrides CAPTURE_IMAGE_PATH.
    #[arg(long)]
    capture_image: Option<PathBuf>,
    /// Initial camera longitude.
    #[arg(long, default_value_t = -0.1276, allow_negative_numbers = true)]
    lng: f64,
    /// Initial camera latitude.
    #[arg(long, default_value_t = 51.5072, allow_negative_numbers = true)]
    lat: f64,
    /// Initial zoom level.
    #[arg(long, default_value_t = 12.0)]
    zoom: f64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let args = Args::parse();
    let mut config = Config::from_env().context("Failed to load configuration")?;
    if args.device.is_some() {
        config.input_device = args.device;
    }
    if let Some(dir) = args.export_dir {
        config.export_dir = dir;
    }
    if args.capture_image.is_some() {
        config.capture_image_path = args.capture_image;
    }

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!(backend = %config.backend_url, "Configuration loaded. Initializing session...");

    // --- 3. Map Tools ---
    let client = http_client();
    let objects = ObjectStore::new();
    let collaborators = Collaborators {
        view: Arc::new(SimulatedMapView::new(
            LngLat::new(args.lng, args.lat),
            args.zoom,
            ViewTimings::default(),
            config.capture_image_path.clone(),
        )),
        segmenter: Arc::new(HttpSegmenter::new(client.clone(), &config.backend_url)),
        geocoder: Arc::new(NominatimGeocoder::new(client.clone(), config.geocoder_url.clone())),
        exporter: Arc::new(HttpExporter::new(
            client,
            &config.backend_url,
            objects.clone(),
            config.export_dir.clone(),
        )),
        events: Arc::new(LoggingEvents),
    };
    let settings = ToolSettings {
        move_settle_timeout: config.move_settle_timeout,
        ..ToolSettings::default()
    };
    let tools = Arc::new(MapTools::new(collaborators, objects, settings));

    // --- 4. Transport ---
    let transport = Arc::new(TransportSession::new(
        Arc::new(BackendCredentialSource::new(
            &config.backend_url,
            config.realtime_model.clone(),
            config.realtime_voice.clone(),
        )),
        Arc::new(WebSocketNegotiator::new(config.negotiation_timeout)),
        Arc::new(CpalAudioDevices),
        TransportSettings {
            input_device: config.input_device.clone(),
            session: agent::session_config(&config),
        },
    ));
    let controller = SessionController::new(transport.clone(), tools.clone());

    let mut status = transport.subscribe_status();
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let current = *status.borrow_and_update();
            info!(status = %current, "Connection status changed");
        }
    });

    // --- 5. Run ---
    if let Err(e) = controller.connect().await {
        error!(error = %e, "Failed to start the voice session");
        if let SessionError::Transport(transport_error) = &e {
            warn!("{}", transport_error.guidance());
        }
        return Err(e.into());
    }
    info!("Voice session started. Speak to the map; press Ctrl+C to stop.");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to install Ctrl+C handler")?;
    info!("Received shutdown signal. Disconnecting...");
    controller.disconnect();
    for capture in tools.pending_captures().active() {
        warn!(capture_id = %capture.id, label = %capture.label, started_at = %capture.started_at, "Capture still running at shutdown");
    }

    for entry in controller.transcript() {
        info!(role = %entry.role, text = %entry.text, "Transcript");
    }
    Ok(())
}
