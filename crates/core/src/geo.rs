//! Geographic value types shared by the tools and the collaborators.

use serde::{Deserialize, Serialize};

/// A longitude/latitude pair, serialized as `[lng, lat]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct LngLat {
    pub lng: f64,
    pub lat: f64,
}

impl LngLat {
    pub fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }
}

impl From<[f64; 2]> for LngLat {
    fn from([lng, lat]: [f64; 2]) -> Self {
        Self { lng, lat }
    }
}

impl From<LngLat> for [f64; 2] {
    fn from(p: LngLat) -> Self {
        [p.lng, p.lat]
    }
}

/// The four projected corners of the viewport.
///
/// A rotated or tilted view is not axis-aligned, so all four are carried
/// alongside the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Corners {
    pub top_left: LngLat,
    pub top_right: LngLat,
    pub bottom_right: LngLat,
    pub bottom_left: LngLat,
}

impl Corners {
    pub fn iter(&self) -> impl Iterator<Item = LngLat> {
        [self.top_left, self.top_right, self.bottom_right, self.bottom_left].into_iter()
    }
}

/// An axis-aligned box, serialized as `[west, south, east, north]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl From<[f64; 4]> for BoundingBox {
    fn from([west, south, east, north]: [f64; 4]) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.west, b.south, b.east, b.north]
    }
}

impl BoundingBox {
    pub fn center(&self) -> LngLat {
        LngLat::new((self.west + self.east) / 2.0, (self.south + self.north) / 2.0)
    }
}

/// Geographic bounds of a capture: the envelope of the corners plus the corners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewBounds {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
    pub corners: Corners,
}

impl ViewBounds {
    /// Derives the envelope from all four projected corners rather than from
    /// the view's own axis-aligned bounds.
    pub fn from_corners(corners: Corners) -> Self {
        let (mut west, mut south) = (f64::INFINITY, f64::INFINITY);
        let (mut east, mut north) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for p in corners.iter() {
            west = west.min(p.lng);
            east = east.max(p.lng);
            south = south.min(p.lat);
            north = north.max(p.lat);
        }
        Self {
            west,
            south,
            east,
            north,
            corners,
        }
    }
}

/// Where a camera transition should end up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CameraTarget {
    Center { center: LngLat, zoom: f64 },
    Bounds(BoundingBox),
}
