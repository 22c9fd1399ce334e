use super::{ExtractObjectsArgs, MapTools, vocabulary};
use crate::barrier::await_stable;
use crate::collaborators::SegmentationRequest;
use crate::geo::ViewBounds;
use crate::objects::GeoFeature;
use anyhow::{Context, bail};
use tracing::{info, warn};

impl MapTools {
    /// Segments the current view for one object category.
    ///
    /// The capture waits for the stabilization barrier, then samples the
    /// viewport corners and renders the frame. New objects are stored and
    /// announced only when the result is non-empty.
    pub async fn extract_objects(&self, args: ExtractObjectsArgs) -> Result<String, String> {
        let requested = args.object_type.trim();
        if requested.is_empty() {
            return Err("An object type is required, e.g. 'buildings'.".to_string());
        }
        let prompt = vocabulary::translate(requested);
        self.events.on_text_prompt_change(&prompt);

        let capture = self.captures.begin(prompt.clone());
        self.events.on_text_segmentation_start();
        let outcome = self.segment_current_view(&prompt).await;
        self.events.on_text_segmentation_complete();

        match outcome {
            Ok(features) if features.is_empty() => {
                capture.complete();
                info!(%prompt, "Segmentation found nothing");
                Err(format!("No {} were found in the current view.", requested))
            }
            Ok(features) => {
                let added = self.objects.extend(features);
                let count = added.len();
                self.events.on_objects_detected(added);
                capture.complete();
                Ok(format!("Found {} {} in the current view.", count, requested))
            }
            Err(e) => {
                warn!(%prompt, error = ?e, "Segmentation failed");
                Err(format!("Could not extract {}: {:#}", requested, e))
            }
        }
    }

    async fn segment_current_view(&self, prompt: &str) -> anyhow::Result<Vec<GeoFeature>> {
        await_stable(self.view.as_ref()).await;
        // Sampled in the same tick as the stability check.
        let bounds = ViewBounds::from_corners(self.view.viewport_corners());
        let image = self
            .view
            .render_frame()
            .await
            .context("failed to capture the map view")?;

        let response = self
            .segmenter
            .segment(SegmentationRequest {
                image,
                prompt: prompt.to_string(),
                bounds,
            })
            .await
            .context("segmentation request failed")?;
        if !response.success {
            bail!(
                "{}",
                response
                    .error
                    .unwrap_or_else(|| "the segmentation service reported a failure".to_string())
            );
        }
        Ok(response.into_features())
    }
}
