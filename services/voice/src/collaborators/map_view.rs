//! A headless map camera for running the voice session without a renderer.
//!
//! Camera commands start a timed transition followed by a tile-loading
//! phase, each ending with the notification a real map would emit. Frames
//! come from a fixed image file.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use geovoice_core::MapView;
use geovoice_core::collaborators::{CapturedImage, ViewNotification, ZoomRange};
use geovoice_core::geo::{BoundingBox, CameraTarget, Corners, LngLat};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::debug;

const TILE_SIZE: f64 = 256.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewTimings {
    pub transition: Duration,
    pub tile_load: Duration,
}

impl Default for ViewTimings {
    fn default() -> Self {
        Self {
            transition: Duration::from_millis(1200),
            tile_load: Duration::from_millis(800),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Camera {
    center: LngLat,
    zoom: f64,
    /// Degrees clockwise from north.
    bearing: f64,
}

struct Inner {
    camera: Mutex<Camera>,
    moving: AtomicBool,
    loaded: AtomicBool,
    generation: AtomicU64,
    notifications: broadcast::Sender<ViewNotification>,
    timings: ViewTimings,
    range: ZoomRange,
    size: (u32, u32),
    image_path: Option<PathBuf>,
}

impl Inner {
    fn camera(&self) -> MutexGuard<'_, Camera> {
        self.camera.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn arrive(&self, target: Camera) {
        *self.camera() = target;
        self.moving.store(false, Ordering::SeqCst);
        let _ = self.notifications.send(ViewNotification::MovementEnded);
    }

    fn finish_loading(&self) {
        self.loaded.store(true, Ordering::SeqCst);
        let _ = self.notifications.send(ViewNotification::ContentIdle);
    }

    async fn run_transition(self: Arc<Self>, generation: u64, target: Camera) {
        tokio::time::sleep(self.timings.transition).await;
        if !self.is_current(generation) {
            debug!(generation, "Camera transition superseded");
            return;
        }
        self.arrive(target);
        tokio::time::sleep(self.timings.tile_load).await;
        if self.is_current(generation) {
            self.finish_loading();
        }
    }
}

pub struct SimulatedMapView {
    inner: Arc<Inner>,
}

impl SimulatedMapView {
    pub fn new(center: LngLat, zoom: f64, timings: ViewTimings, image_path: Option<PathBuf>) -> Self {
        let (notifications, _) = broadcast::channel(32);
        Self {
            inner: Arc::new(Inner {
                camera: Mutex::new(Camera {
                    center,
                    zoom,
                    bearing: 0.0,
                }),
                moving: AtomicBool::new(false),
                loaded: AtomicBool::new(true),
                generation: AtomicU64::new(0),
                notifications,
                timings,
                range: ZoomRange { min: 0.0, max: 22.0 },
                size: (1024, 768),
                image_path,
            }),
        }
    }

    pub fn center(&self) -> LngLat {
        self.inner.camera().center
    }

    pub fn set_bearing(&self, bearing: f64) {
        self.inner.camera().bearing = bearing.rem_euclid(360.0);
    }

    /// Degrees of longitude per pixel at `zoom`.
    fn degrees_per_pixel(zoom: f64) -> f64 {
        360.0 / (TILE_SIZE * 2f64.powf(zoom))
    }

    fn zoom_to_fit(&self, bbox: &BoundingBox) -> f64 {
        let (width, height) = self.inner.size;
        let lng_span = (bbox.east - bbox.west).abs();
        let lat_span = (bbox.north - bbox.south).abs();
        if lng_span <= f64::EPSILON || lat_span <= f64::EPSILON {
            return self.inner.range.max;
        }
        let by_width = (width as f64 * 360.0 / (TILE_SIZE * lng_span)).log2();
        let by_height = (height as f64 * 360.0 / (TILE_SIZE * lat_span)).log2();
        self.inner.range.clamp(by_width.min(by_height))
    }

    fn start_transition(&self, target: Camera) {
        let inner = &self.inner;
        let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        inner.moving.store(true, Ordering::SeqCst);
        inner.loaded.store(false, Ordering::SeqCst);
        debug!(generation, zoom = target.zoom, lng = target.center.lng, lat = target.center.lat, "Camera transition started");
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(inner.clone().run_transition(generation, target));
            }
            Err(_) => {
                inner.arrive(target);
                inner.finish_loading();
            }
        }
    }
}

#[async_trait]
impl MapView for SimulatedMapView {
    fn is_moving(&self) -> bool {
        self.inner.moving.load(Ordering::SeqCst)
    }

    fn is_loaded(&self) -> bool {
        self.inner.loaded.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> broadcast::Receiver<ViewNotification> {
        self.inner.notifications.subscribe()
    }

    fn zoom(&self) -> f64 {
        self.inner.camera().zoom
    }

    fn zoom_range(&self) -> ZoomRange {
        self.inner.range
    }

    fn viewport_corners(&self) -> Corners {
        let camera = *self.inner.camera();
        let (width, height) = self.inner.size;
        let per_px = Self::degrees_per_pixel(camera.zoom);
        let half_w = width as f64 / 2.0 * per_px;
        let half_h = height as f64 / 2.0 * per_px * camera.center.lat.to_radians().cos();
        let (sin, cos) = camera.bearing.to_radians().sin_cos();
        // Screen offsets (right, up) rotated into (east, north).
        let project = |dx: f64, dy: f64| {
            LngLat::new(
                camera.center.lng + dx * cos + dy * sin,
                camera.center.lat - dx * sin + dy * cos,
            )
        };
        Corners {
            top_left: project(-half_w, half_h),
            top_right: project(half_w, half_h),
            bottom_right: project(half_w, -half_h),
            bottom_left: project(-half_w, -half_h),
        }
    }

    fn fly_to(&self, target: CameraTarget) {
        let current = *self.inner.camera();
        let camera = match target {
            CameraTarget::Center { center, zoom } => Camera {
                center,
                zoom: self.inner.range.clamp(zoom),
                ..current
            },
            CameraTarget::Bounds(bbox) => Camera {
                center: bbox.center(),
                zoom: self.zoom_to_fit(&bbox),
                ..current
            },
        };
        self.start_transition(camera);
    }

    fn set_zoom(&self, zoom: f64) {
        let current = *self.inner.camera();
        self.start_transition(Camera {
            zoom: self.inner.range.clamp(zoom),
            ..current
        });
    }

    async fn render_frame(&self) -> Result<CapturedImage> {
        let Some(path) = &self.inner.image_path else {
            bail!("no capture image configured (set CAPTURE_IMAGE_PATH)");
        };
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let mime_type = match path.extension().and_then(|e| e.to_str()) {
            Some("jpg") | Some("jpeg") => "image/jpeg",
            _ => "image/png",
        };
        let (width, height) = self.inner.size;
        Ok(CapturedImage {
            bytes,
            width,
            height,
            mime_type: mime_type.to_string(),
        })
    }
}
