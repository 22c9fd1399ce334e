use super::MapTools;
use tracing::warn;

impl MapTools {
    /// Exports every tracked object, read from the store at call time.
    pub async fn export_data(&self) -> Result<String, String> {
        let count = self.objects.len();
        if count == 0 {
            return Err("There are no detected objects to export. Extract some objects first.".to_string());
        }
        if self.exporter.export_shapefile().await {
            Ok(format!("Exported {} objects as a shapefile.", count))
        } else {
            warn!(count, "Export collaborator reported failure");
            Err("The export failed. Please try again.".to_string())
        }
    }
}
