//! Implementations of the core collaborator traits for the standalone voice service.

mod events;
mod exporter;
mod geocoder;
mod map_view;
mod segmenter;

pub use events::LoggingEvents;
pub use exporter::HttpExporter;
pub use geocoder::NominatimGeocoder;
pub use map_view::{SimulatedMapView, ViewTimings};
pub use segmenter::HttpSegmenter;

use std::time::Duration;

/// The HTTP client shared by the collaborators.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(concat!("geovoice/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(120))
        .build()
        .unwrap_or_default()
}
