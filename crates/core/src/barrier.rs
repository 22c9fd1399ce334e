//! Stabilization barrier.
//!
//! Capture-dependent tools must not sample the view or its bounds while the
//! camera is moving or tiles are still loading, or the image and the bounds
//! sent with it will not match. Neither state has a fixed duration, so the
//! barrier waits on the view's own notifications. It never fails.

use crate::collaborators::{MapView, ViewNotification};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

/// How a bounded wait for the end of a camera movement finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settled {
    MovementEnded,
    /// The timeout elapsed first. The caller proceeds anyway.
    TimedOut,
    /// The view stopped emitting notifications altogether.
    Detached,
}

/// Resolves once the view is both not moving and fully loaded.
///
/// The subscription is taken before the first check so no notification can
/// slip in between, and it is dropped on return.
pub async fn await_stable(view: &dyn MapView) {
    let mut notifications = view.subscribe();
    loop {
        if !view.is_moving() && view.is_loaded() {
            return;
        }
        match notifications.recv().await {
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                debug!(skipped, "Barrier lagged behind view notifications; re-checking state");
            }
            Err(RecvError::Closed) => {
                warn!("View notification channel closed while waiting for stability");
                return;
            }
        }
    }
}

/// Resolves on the next movement-ended notification or after `timeout`.
pub async fn await_movement_settled(view: &dyn MapView, timeout: Duration) -> Settled {
    wait_for_movement_end(view.subscribe(), timeout).await
}

/// Same as [`await_movement_settled`] on a subscription taken earlier, so a
/// caller can subscribe before triggering the transition it waits for.
pub async fn wait_for_movement_end(
    mut notifications: broadcast::Receiver<ViewNotification>,
    timeout: Duration,
) -> Settled {
    let ended = async {
        loop {
            match notifications.recv().await {
                Ok(ViewNotification::MovementEnded) => return Settled::MovementEnded,
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return Settled::Detached,
            }
        }
    };
    match tokio::time::timeout(timeout, ended).await {
        Ok(settled) => settled,
        Err(_) => {
            warn!(timeout_ms = timeout.as_millis() as u64, "Camera movement did not report completion in time; proceeding");
            Settled::TimedOut
        }
    }
}
