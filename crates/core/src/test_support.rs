//! A scripted map view for unit tests.

use crate::collaborators::{
    CapturedImage, MapView, MockAppEvents, MockExporter, MockGeocoder, MockSegmenter,
    ViewNotification, ZoomRange,
};
use crate::geo::{CameraTarget, Corners, LngLat};
use crate::objects::ObjectStore;
use crate::tools::{Collaborators, MapTools, ToolSettings};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;

pub(crate) struct FakeView {
    zoom: Mutex<f64>,
    range: ZoomRange,
    moving: AtomicBool,
    loaded: AtomicBool,
    /// When set, camera commands complete instantly and emit both notifications.
    auto_settle: AtomicBool,
    notifications: broadcast::Sender<ViewNotification>,
    pub zoom_calls: Mutex<Vec<f64>>,
    pub fly_calls: Mutex<Vec<CameraTarget>>,
    pub renders: Mutex<usize>,
}

impl FakeView {
    pub fn new(zoom: f64) -> Self {
        let (notifications, _) = broadcast::channel(16);
        Self {
            zoom: Mutex::new(zoom),
            range: ZoomRange { min: 0.0, max: 20.0 },
            moving: AtomicBool::new(false),
            loaded: AtomicBool::new(true),
            auto_settle: AtomicBool::new(true),
            notifications,
            zoom_calls: Mutex::new(Vec::new()),
            fly_calls: Mutex::new(Vec::new()),
            renders: Mutex::new(0),
        }
    }

    pub fn set_moving(&self, moving: bool) {
        self.moving.store(moving, Ordering::SeqCst);
    }

    pub fn set_loaded(&self, loaded: bool) {
        self.loaded.store(loaded, Ordering::SeqCst);
    }

    pub fn set_auto_settle(&self, auto: bool) {
        self.auto_settle.store(auto, Ordering::SeqCst);
    }

    pub fn notify(&self, notification: ViewNotification) {
        let _ = self.notifications.send(notification);
    }

    pub fn subscriber_count(&self) -> usize {
        self.notifications.receiver_count()
    }

    pub fn current_zoom(&self) -> f64 {
        *self.zoom.lock().unwrap()
    }

    fn begin_transition(&self) {
        if self.auto_settle.load(Ordering::SeqCst) {
            self.notify(ViewNotification::MovementEnded);
            self.notify(ViewNotification::ContentIdle);
        } else {
            self.set_moving(true);
        }
    }
}

#[async_trait]
impl MapView for FakeView {
    fn is_moving(&self) -> bool {
        self.moving.load(Ordering::SeqCst)
    }

    fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> broadcast::Receiver<ViewNotification> {
        self.notifications.subscribe()
    }

    fn zoom(&self) -> f64 {
        self.current_zoom()
    }

    fn zoom_range(&self) -> ZoomRange {
        self.range
    }

    fn viewport_corners(&self) -> Corners {
        Corners {
            top_left: LngLat::new(-0.1, 51.6),
            top_right: LngLat::new(0.1, 51.6),
            bottom_right: LngLat::new(0.1, 51.4),
            bottom_left: LngLat::new(-0.1, 51.4),
        }
    }

    fn fly_to(&self, target: CameraTarget) {
        self.fly_calls.lock().unwrap().push(target);
        self.begin_transition();
    }

    fn set_zoom(&self, zoom: f64) {
        *self.zoom.lock().unwrap() = zoom;
        self.zoom_calls.lock().unwrap().push(zoom);
        self.begin_transition();
    }

    async fn render_frame(&self) -> Result<CapturedImage> {
        *self.renders.lock().unwrap() += 1;
        Ok(CapturedImage {
            bytes: vec![0x89, b'P', b'N', b'G'],
            width: 512,
            height: 512,
            mime_type: "image/png".to_string(),
        })
    }
}

/// Mocks for every collaborator, assembled into [`MapTools`] by [`Harness::build`].
pub(crate) struct Harness {
    pub view: Arc<FakeView>,
    pub segmenter: MockSegmenter,
    pub geocoder: MockGeocoder,
    pub exporter: MockExporter,
    pub events: MockAppEvents,
    pub objects: ObjectStore,
}

impl Harness {
    pub fn new(zoom: f64) -> Self {
        Self {
            view: Arc::new(FakeView::new(zoom)),
            segmenter: MockSegmenter::new(),
            geocoder: MockGeocoder::new(),
            exporter: MockExporter::new(),
            events: MockAppEvents::new(),
            objects: ObjectStore::new(),
        }
    }

    /// Accepts any segmentation progress notifications. Detection stays strict.
    pub fn quiet_events(mut self) -> Self {
        self.events.expect_on_text_prompt_change().return_const(());
        self.events.expect_on_text_segmentation_start().return_const(());
        self.events.expect_on_text_segmentation_complete().return_const(());
        self
    }

    pub fn build(self) -> MapTools {
        MapTools::new(
            Collaborators {
                view: self.view,
                segmenter: Arc::new(self.segmenter),
                geocoder: Arc::new(self.geocoder),
                exporter: Arc::new(self.exporter),
                events: Arc::new(self.events),
            },
            self.objects,
            ToolSettings::default(),
        )
    }
}
