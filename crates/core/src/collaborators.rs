//! Interfaces to the parts of the application the core does not own.
//!
//! The map renderer, the segmentation backend, place-name lookup, file export
//! and the UI are all consumed through these traits. Implementations live in
//! the service crate (or in tests).

use crate::geo::{BoundingBox, CameraTarget, Corners, LngLat, ViewBounds};
use crate::objects::GeoFeature;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Notifications a map view emits while its camera and content change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewNotification {
    /// A camera transition (fly-to, zoom, pan) finished.
    MovementEnded,
    /// All visible tiles finished loading and rendering.
    ContentIdle,
}

/// The zoom levels a platform supports, inclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomRange {
    pub min: f64,
    pub max: f64,
}

impl ZoomRange {
    pub fn contains(&self, level: f64) -> bool {
        level >= self.min && level <= self.max
    }

    pub fn clamp(&self, level: f64) -> f64 {
        level.clamp(self.min, self.max)
    }
}

/// A rendered frame of the current view.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub mime_type: String,
}

/// The live map view.
///
/// State getters are synchronous and always return the current value.
/// Camera commands return immediately; the transition proceeds on its own and
/// ends with [`ViewNotification::MovementEnded`].
#[async_trait]
pub trait MapView: Send + Sync {
    fn is_moving(&self) -> bool;
    fn is_loaded(&self) -> bool;
    /// Dropping the receiver unsubscribes.
    fn subscribe(&self) -> broadcast::Receiver<ViewNotification>;
    fn zoom(&self) -> f64;
    fn zoom_range(&self) -> ZoomRange;
    fn viewport_corners(&self) -> Corners;
    fn fly_to(&self, target: CameraTarget);
    fn set_zoom(&self, zoom: f64);
    async fn render_frame(&self) -> Result<CapturedImage>;
}

/// Input to the segmentation backend: an image, a prompt and where the image is.
#[derive(Debug, Clone)]
pub struct SegmentationRequest {
    pub image: CapturedImage,
    pub prompt: String,
    pub bounds: ViewBounds,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SegmentationResponse {
    pub success: bool,
    #[serde(default)]
    pub geojson: Option<FeatureCollectionBody>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeatureCollectionBody {
    #[serde(default)]
    pub features: Vec<GeoFeature>,
}

impl SegmentationResponse {
    /// Absent `geojson` or `features` both mean "nothing found".
    pub fn into_features(self) -> Vec<GeoFeature> {
        self.geojson.map(|g| g.features).unwrap_or_default()
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Segmenter: Send + Sync {
    async fn segment(&self, request: SegmentationRequest) -> Result<SegmentationResponse>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeocodeResult {
    pub found: bool,
    #[serde(default)]
    pub coordinates: Option<LngLat>,
    #[serde(default)]
    pub bbox: Option<BoundingBox>,
    #[serde(default)]
    pub place_name: Option<String>,
}

impl GeocodeResult {
    pub fn not_found() -> Self {
        Self::default()
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, place_name: &str) -> Result<GeocodeResult>;
}

/// Exports every tracked object. Only the outcome is reported.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Exporter: Send + Sync {
    async fn export_shapefile(&self) -> bool;
}

/// One-way notifications to the surrounding application.
#[cfg_attr(test, mockall::automock)]
pub trait AppEvents: Send + Sync {
    fn on_objects_detected(&self, objects: Vec<GeoFeature>);
    fn on_text_segmentation_start(&self);
    fn on_text_segmentation_complete(&self);
    fn on_text_prompt_change(&self, prompt: &str);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zoom_range() {
        let range = ZoomRange { min: 0.0, max: 20.0 };
        assert!(range.contains(20.0));
        assert!(!range.contains(25.0));
        assert_eq!(range.clamp(21.0), 20.0);
        assert_eq!(range.clamp(-1.0), 0.0);
    }

    #[test]
    fn test_segmentation_response_without_features_is_empty() {
        let absent: SegmentationResponse = serde_json::from_str(r#"{"success": true}"#).unwrap();
        assert!(absent.into_features().is_empty());
        let empty: SegmentationResponse = serde_json::from_str(
            r#"{"success": true, "geojson": {"type": "FeatureCollection", "features": []}, "text_prompt": "tree"}"#,
        )
        .unwrap();
        assert!(empty.into_features().is_empty());
    }

    #[test]
    fn test_segmentation_response_features() {
        let response: SegmentationResponse = serde_json::from_str(
            r#"{"success": true, "geojson": {"features": [
                {"type": "Feature", "id": "f1", "geometry": {"type": "Polygon", "coordinates": []}, "properties": {"class": "building"}},
                {"type": "Feature", "geometry": {"type": "Polygon", "coordinates": []}}
            ]}}"#,
        )
        .unwrap();
        let features = response.into_features();
        assert_eq!(features.len(), 2);
        assert_eq!(features[0].id.as_deref(), Some("f1"));
        assert_eq!(features[0].properties["class"], "building");
        assert!(features[1].id.is_none());
    }

    #[test]
    fn test_geocode_result_wire_names() {
        let result: GeocodeResult = serde_json::from_str(
            r#"{"found": true, "coordinates": [2.35, 48.85], "bbox": [2.2, 48.8, 2.5, 48.9], "placeName": "Paris, France"}"#,
        )
        .unwrap();
        assert!(result.found);
        assert_eq!(result.place_name.as_deref(), Some("Paris, France"));
        assert_eq!(result.coordinates, Some(LngLat::new(2.35, 48.85)));
    }
}
