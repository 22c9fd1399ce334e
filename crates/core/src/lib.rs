//! Core of the voice-driven map session.
//!
//! Everything here is independent of the transport: the collaborator traits
//! the map application implements, the stabilization barrier that gates
//! capture-dependent work, and the tool registry and dispatcher that execute
//! agent-issued commands one at a time.

pub mod barrier;
pub mod collaborators;
pub mod geo;
pub mod objects;
pub mod pending;
pub mod tools;
pub mod transcript;

#[cfg(test)]
pub(crate) mod test_support;

pub use collaborators::{AppEvents, Exporter, Geocoder, MapView, Segmenter};
pub use objects::{GeoFeature, ObjectStore};
pub use tools::{Collaborators, MapTools, ToolSettings, dispatcher::{Dispatcher, ResultSink, ToolExecutor}};
