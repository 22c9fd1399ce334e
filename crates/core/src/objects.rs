//! Detected objects and the store every tool reads them from.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

/// A GeoJSON feature produced by segmentation or a manual selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoFeature {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub geometry: Value,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl GeoFeature {
    pub fn to_geojson(&self) -> Value {
        let mut feature = json!({
            "type": "Feature",
            "geometry": self.geometry,
            "properties": self.properties,
        });
        if let Some(id) = &self.id {
            feature["id"] = Value::String(id.clone());
        }
        feature
    }
}

/// Wraps features into a GeoJSON `FeatureCollection`.
pub fn feature_collection(features: &[GeoFeature]) -> Value {
    json!({
        "type": "FeatureCollection",
        "features": features.iter().map(GeoFeature::to_geojson).collect::<Vec<_>>(),
    })
}

/// The single owned, continuously updated set of tracked objects.
///
/// Voice tools and UI-driven actions (manual point-clicks) both write here,
/// so readers must call [`ObjectStore::snapshot`] at the point of use and never
/// hold a copy across an await.
#[derive(Clone, Debug)]
pub struct ObjectStore {
    tx: Arc<watch::Sender<Vec<GeoFeature>>>,
}

impl Default for ObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Vec::new());
        Self { tx: Arc::new(tx) }
    }

    pub fn snapshot(&self) -> Vec<GeoFeature> {
        self.tx.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.tx.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.borrow().is_empty()
    }

    /// Appends features, giving an id to any that arrived without one.
    /// Returns the features as stored.
    pub fn extend(&self, features: Vec<GeoFeature>) -> Vec<GeoFeature> {
        let added: Vec<GeoFeature> = features
            .into_iter()
            .map(|mut f| {
                if f.id.is_none() {
                    f.id = Some(Uuid::new_v4().to_string());
                }
                f
            })
            .collect();
        if !added.is_empty() {
            self.tx.send_modify(|objects| objects.extend(added.iter().cloned()));
        }
        added
    }

    pub fn clear(&self) {
        self.tx.send_modify(Vec::clear);
    }

    /// Change notifications for observers such as a UI list.
    pub fn subscribe(&self) -> watch::Receiver<Vec<GeoFeature>> {
        self.tx.subscribe()
    }
}
