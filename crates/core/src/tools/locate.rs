use super::{LocatePlaceArgs, MapTools};
use crate::barrier::{Settled, await_stable, wait_for_movement_end};
use crate::geo::CameraTarget;
use tracing::{info, warn};

impl MapTools {
    /// Resolves a place name and flies the camera there.
    ///
    /// Returns only after the transition has settled (or timed out) and the
    /// destination has finished loading, so a following capture sees the new
    /// view.
    pub async fn locate_place(&self, args: LocatePlaceArgs) -> Result<String, String> {
        let query = args.place_name.trim();
        if query.is_empty() {
            return Err("A place name is required.".to_string());
        }

        let result = self
            .geocoder
            .geocode(query)
            .await
            .map_err(|e| format!("Could not look up '{}': {:#}", query, e))?;
        if !result.found {
            return Err(format!("Location not found: '{}'.", query));
        }

        let target = match (result.bbox, result.coordinates) {
            (Some(bbox), _) => CameraTarget::Bounds(bbox),
            (None, Some(center)) => CameraTarget::Center {
                center,
                zoom: self.settings.locate_zoom,
            },
            (None, None) => {
                warn!(%query, "Geocoder reported a match without coordinates");
                return Err(format!("Location not found: '{}'.", query));
            }
        };
        let label = result.place_name.unwrap_or_else(|| query.to_string());

        // Subscribe before the transition starts so its end cannot be missed.
        let movement = self.view.subscribe();
        self.view.fly_to(target);
        if wait_for_movement_end(movement, self.settings.move_settle_timeout).await == Settled::TimedOut {
            info!(place = %label, "Proceeding after fly-to timeout");
        }
        await_stable(self.view.as_ref()).await;

        Ok(format!("Moved the map to {}.", label))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::GeocodeResult;
    use crate::geo::{BoundingBox, LngLat};
    use crate::test_support::Harness;

    fn args(name: &str) -> LocatePlaceArgs {
        LocatePlaceArgs {
            place_name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn test_locate_flies_to_bbox() {
        let mut harness = Harness::new(3.0);
        harness
            .geocoder
            .expect_geocode()
            .withf(|name| name == "Paris")
            .returning(|_| {
                Ok(GeocodeResult {
                    found: true,
                    coordinates: Some(LngLat::new(2.35, 48.85)),
                    bbox: Some(BoundingBox::from([2.22, 48.81, 2.47, 48.90])),
                    place_name: Some("Paris, France".into()),
                })
            });
        let view = harness.view.clone();
        let tools = harness.build();

        let msg = tools.locate_place(args(" Paris ")).await.unwrap();
        assert_eq!(msg, "Moved the map to Paris, France.");
        let flights = view.fly_calls.lock().unwrap();
        assert!(matches!(flights[0], CameraTarget::Bounds(b) if b.west == 2.22));
        assert_eq!(view.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_locate_point_uses_default_zoom() {
        let mut harness = Harness::new(3.0);
        harness.geocoder.expect_geocode().returning(|_| {
            Ok(GeocodeResult {
                found: true,
                coordinates: Some(LngLat::new(-0.12, 51.5)),
                bbox: None,
                place_name: None,
            })
        });
        let view = harness.view.clone();
        let tools = harness.build();

        let msg = tools.locate_place(args("Big Ben")).await.unwrap();
        assert_eq!(msg, "Moved the map to Big Ben.");
        assert!(matches!(
            view.fly_calls.lock().unwrap()[0],
            CameraTarget::Center { zoom, .. } if zoom == 14.0
        ));
    }

    #[tokio::test]
    async fn test_locate_not_found_leaves_camera() {
        let mut harness = Harness::new(3.0);
        harness.geocoder.expect_geocode().returning(|_| Ok(GeocodeResult::not_found()));
        let view = harness.view.clone();
        let tools = harness.build();

        let err = tools.locate_place(args("Atlantis")).await.unwrap_err();
        assert!(err.contains("not found"));
        assert!(view.fly_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_locate_geocoder_error_becomes_message() {
        let mut harness = Harness::new(3.0);
        harness
            .geocoder
            .expect_geocode()
            .returning(|_| Err(anyhow::anyhow!("service unavailable")));
        let tools = harness.build();
        let err = tools.locate_place(args("Rome")).await.unwrap_err();
        assert!(err.contains("service unavailable"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_locate_waits_for_tiles_after_timeout() {
        let mut harness = Harness::new(3.0);
        harness.geocoder.expect_geocode().returning(|_| {
            Ok(GeocodeResult {
                found: true,
                coordinates: Some(LngLat::new(0.0, 0.0)),
                bbox: None,
                place_name: Some("Null Island".into()),
            })
        });
        harness.view.set_auto_settle(false);
        let view = harness.view.clone();
        let tools = std::sync::Arc::new(harness.build());

        let task = {
            let tools = tools.clone();
            tokio::spawn(async move { tools.locate_place(args("Null Island")).await })
        };
        // Past the movement timeout the tool still waits for the view to stabilize.
        tokio::time::sleep(std::time::Duration::from_millis(3500)).await;
        assert!(!task.is_finished());

        view.set_moving(false);
        view.notify(crate::collaborators::ViewNotification::ContentIdle);
        assert_eq!(task.await.unwrap().unwrap(), "Moved the map to Null Island.");
    }
}
