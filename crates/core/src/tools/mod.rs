//! Map Tool Registry
//!
//! This module declares every command the voice agent may invoke, together
//! with the JSON schema of its arguments, and implements each command against
//! the map collaborators. Handlers return `Ok(message)` or `Err(reason)`; both
//! are prose for the agent. The [`dispatcher`] turns them into tool results.

pub mod dispatcher;
mod export;
mod extract;
mod locate;
pub mod vocabulary;
mod zoom;

use crate::collaborators::{AppEvents, Exporter, Geocoder, MapView, Segmenter};
use crate::objects::ObjectStore;
use crate::pending::PendingCaptures;
use openai_realtime_types::client::ToolDefinition;
use schemars::JsonSchema;
use schemars::generate::SchemaSettings;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub const LOCATE_PLACE: &str = "locate_place";
pub const EXTRACT_OBJECTS: &str = "extract_objects";
pub const ZOOM_MAP: &str = "zoom_map";
pub const EXPORT_DATA: &str = "export_data";

// --- Tool arguments ---

/// Arguments for `locate_place`.
#[derive(Deserialize, JsonSchema, Debug)]
pub struct LocatePlaceArgs {
    /// The place to move the map to.
    #[schemars(description = "Name of a city, landmark, address or region, e.g. 'Central Park, New York'")]
    pub place_name: String,
}

/// Arguments for `extract_objects`.
#[derive(Deserialize, JsonSchema, Debug)]
pub struct ExtractObjectsArgs {
    #[schemars(description = "The kind of object to find in the current view, e.g. 'buildings', 'trees', 'cars'")]
    pub object_type: String,
}

#[derive(Deserialize, JsonSchema, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ZoomAction {
    ZoomIn,
    ZoomOut,
    ZoomTo,
}

/// Arguments for `zoom_map`.
#[derive(Deserialize, JsonSchema, Debug)]
pub struct ZoomMapArgs {
    #[schemars(description = "'zoom_in' or 'zoom_out' to step relative to the current zoom, 'zoom_to' for an absolute level")]
    pub action: ZoomAction,
    #[schemars(description = "Absolute zoom level, required for 'zoom_to'")]
    #[serde(default)]
    pub level: Option<f64>,
    #[schemars(description = "How many levels to step for 'zoom_in'/'zoom_out' (default 2)")]
    #[serde(default)]
    pub steps: Option<f64>,
}

/// `export_data` takes no arguments.
#[derive(Deserialize, JsonSchema, Debug, Default)]
pub struct ExportDataArgs {}

// --- Service ---

#[derive(Debug, Clone)]
pub struct ToolSettings {
    /// Upper bound on waiting for a camera transition to report completion.
    pub move_settle_timeout: Duration,
    pub default_zoom_steps: f64,
    /// Zoom used when a place resolves to a point without a bounding box.
    pub locate_zoom: f64,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            move_settle_timeout: Duration::from_millis(3000),
            default_zoom_steps: 2.0,
            locate_zoom: 14.0,
        }
    }
}

/// The external collaborators the tools act on.
#[derive(Clone)]
pub struct Collaborators {
    pub view: Arc<dyn MapView>,
    pub segmenter: Arc<dyn Segmenter>,
    pub geocoder: Arc<dyn Geocoder>,
    pub exporter: Arc<dyn Exporter>,
    pub events: Arc<dyn AppEvents>,
}

/// The agent-invocable map commands.
///
/// Shared state (tracked objects, the camera) is always read through the
/// collaborators at call time, never from a copy taken earlier.
pub struct MapTools {
    view: Arc<dyn MapView>,
    segmenter: Arc<dyn Segmenter>,
    geocoder: Arc<dyn Geocoder>,
    exporter: Arc<dyn Exporter>,
    events: Arc<dyn AppEvents>,
    objects: ObjectStore,
    captures: PendingCaptures,
    settings: ToolSettings,
}

impl MapTools {
    pub fn new(collaborators: Collaborators, objects: ObjectStore, settings: ToolSettings) -> Self {
        Self {
            view: collaborators.view,
            segmenter: collaborators.segmenter,
            geocoder: collaborators.geocoder,
            exporter: collaborators.exporter,
            events: collaborators.events,
            objects,
            captures: PendingCaptures::new(),
            settings,
        }
    }

    /// Captures currently in flight, for status display.
    pub fn pending_captures(&self) -> &PendingCaptures {
        &self.captures
    }

    /// The tool list sent to the agent in the session configuration.
    pub fn declarations() -> Vec<ToolDefinition> {
        vec![
            declare::<LocatePlaceArgs>(
                LOCATE_PLACE,
                "Find a place by name and move the map camera to it.",
            ),
            declare::<ExtractObjectsArgs>(
                EXTRACT_OBJECTS,
                "Detect and outline objects of a given type in the current map view.",
            ),
            declare::<ZoomMapArgs>(
                ZOOM_MAP,
                "Zoom the map in or out by a number of levels, or to an absolute zoom level.",
            ),
            declare::<ExportDataArgs>(
                EXPORT_DATA,
                "Export all currently detected objects as a shapefile.",
            ),
        ]
    }

    /// Runs one tool by name with unvalidated arguments.
    pub async fn call(&self, name: &str, arguments: Value) -> Result<String, String> {
        info!(tool = %name, args = %arguments, "Executing tool");
        match name {
            LOCATE_PLACE => self.locate_place(parse_args(name, arguments)?).await,
            EXTRACT_OBJECTS => self.extract_objects(parse_args(name, arguments)?).await,
            ZOOM_MAP => self.zoom_map(parse_args(name, arguments)?).await,
            EXPORT_DATA => {
                let _: ExportDataArgs = parse_args(name, arguments)?;
                self.export_data().await
            }
            other => Err(format!("Unknown tool: '{}'", other)),
        }
    }
}

fn parse_args<T: DeserializeOwned>(tool: &str, arguments: Value) -> Result<T, String> {
    serde_json::from_value(arguments)
        .map_err(|e| format!("Invalid arguments for '{}': {}", tool, e))
}

fn declare<T: JsonSchema>(name: &str, description: &str) -> ToolDefinition {
    let schema = SchemaSettings::draft07()
        .with(|s| s.inline_subschemas = true)
        .into_generator()
        .into_root_schema_for::<T>();
    let mut parameters = schema.to_value();
    if let Some(object) = parameters.as_object_mut() {
        object.remove("$schema");
        object.remove("title");
        object.remove("description");
    }
    ToolDefinition::Function {
        name: name.to_string(),
        description: description.to_string(),
        parameters,
    }
}
