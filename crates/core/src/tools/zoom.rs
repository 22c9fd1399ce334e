use super::{MapTools, ZoomAction, ZoomMapArgs};
use crate::barrier::wait_for_movement_end;

impl MapTools {
    /// Steps the zoom relative to the current level (clamped to the platform
    /// range) or sets an absolute level (rejected when out of range).
    pub async fn zoom_map(&self, args: ZoomMapArgs) -> Result<String, String> {
        let range = self.view.zoom_range();
        let current = self.view.zoom();

        let target = match args.action {
            ZoomAction::ZoomIn | ZoomAction::ZoomOut => {
                let steps = args.steps.unwrap_or(self.settings.default_zoom_steps);
                if !steps.is_finite() || steps <= 0.0 {
                    return Err(format!("Zoom steps must be a positive number, got {}.", steps));
                }
                let delta = if args.action == ZoomAction::ZoomIn { steps } else { -steps };
                range.clamp(current + delta)
            }
            ZoomAction::ZoomTo => {
                let level = args
                    .level
                    .ok_or_else(|| "The 'zoom_to' action requires a level.".to_string())?;
                if !level.is_finite() || !range.contains(level) {
                    return Err(format!(
                        "Zoom level {} is out of range. Valid levels are {} to {}.",
                        level, range.min, range.max
                    ));
                }
                level
            }
        };

        if (target - current).abs() < f64::EPSILON {
            return Ok(format!("The map is already at zoom level {}.", target));
        }

        let movement = self.view.subscribe();
        self.view.set_zoom(target);
        wait_for_movement_end(movement, self.settings.move_settle_timeout).await;
        Ok(format!("Zoomed the map to level {}.", target))
    }
}
