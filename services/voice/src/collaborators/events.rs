use geovoice_core::{AppEvents, GeoFeature};
use tracing::info;

/// Reports application notifications to the log.
#[derive(Debug, Default)]
pub struct LoggingEvents;

impl AppEvents for LoggingEvents {
    fn on_objects_detected(&self, objects: Vec<GeoFeature>) {
        info!(count = objects.len(), "Objects detected");
    }

    fn on_text_segmentation_start(&self) {
        info!("Segmentation started");
    }

    fn on_text_segmentation_complete(&self) {
        info!("Segmentation finished");
    }

    fn on_text_prompt_change(&self, prompt: &str) {
        info!(%prompt, "Segmentation prompt");
    }
}
