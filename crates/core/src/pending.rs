//! In-flight view-dependent captures.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureStatus {
    Processing,
    Complete,
}

#[derive(Debug, Clone, Serialize)]
pub struct PendingCapture {
    pub id: Uuid,
    pub label: String,
    pub started_at: DateTime<Utc>,
    pub status: CaptureStatus,
}

/// The set of captures currently running. Voice and UI captures may overlap.
#[derive(Debug, Clone, Default)]
pub struct PendingCaptures {
    inner: Arc<Mutex<Vec<PendingCapture>>>,
}

impl PendingCaptures {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a capture. It stays active until the returned guard is
    /// completed or dropped.
    pub fn begin(&self, label: impl Into<String>) -> CaptureGuard {
        let capture = PendingCapture {
            id: Uuid::new_v4(),
            label: label.into(),
            started_at: Utc::now(),
            status: CaptureStatus::Processing,
        };
        let id = capture.id;
        self.lock().push(capture);
        CaptureGuard {
            id,
            registry: self.clone(),
        }
    }

    pub fn active(&self) -> Vec<PendingCapture> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<PendingCapture>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Removes its capture from the active set on drop, on every exit path.
#[derive(Debug)]
pub struct CaptureGuard {
    id: Uuid,
    registry: PendingCaptures,
}

impl CaptureGuard {
    /// Marks the capture complete, then releases it.
    pub fn complete(self) {
        if let Some(capture) = self.registry.lock().iter_mut().find(|c| c.id == self.id) {
            capture.status = CaptureStatus::Complete;
            let elapsed = Utc::now() - capture.started_at;
            debug!(capture_id = %capture.id, label = %capture.label, elapsed_ms = elapsed.num_milliseconds(), "Capture complete");
        }
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        self.registry.lock().retain(|c| c.id != self.id);
    }
}
