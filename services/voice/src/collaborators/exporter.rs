use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use geovoice_core::objects::feature_collection;
use geovoice_core::{Exporter, ObjectStore};
use std::path::PathBuf;
use tracing::{error, info};

pub const EXPORT_FILE_NAME: &str = "segmentation_shapefile.zip";

/// Converts the tracked objects to a zipped shapefile through the backend.
pub struct HttpExporter {
    client: reqwest::Client,
    endpoint: String,
    objects: ObjectStore,
    export_dir: PathBuf,
}

impl HttpExporter {
    pub fn new(client: reqwest::Client, backend_url: &str, objects: ObjectStore, export_dir: PathBuf) -> Self {
        Self {
            client,
            endpoint: format!("{}/api/export-shapefile", backend_url.trim_end_matches('/')),
            objects,
            export_dir,
        }
    }

    async fn export(&self) -> Result<PathBuf> {
        let snapshot = self.objects.snapshot();
        let response = self
            .client
            .post(&self.endpoint)
            .json(&feature_collection(&snapshot))
            .send()
            .await
            .context("export backend unreachable")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("export backend returned {}: {}", status, body);
        }
        let archive = response.bytes().await.context("failed to read the archive")?;
        let path = self.export_dir.join(EXPORT_FILE_NAME);
        tokio::fs::write(&path, &archive)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!(path = %path.display(), objects = snapshot.len(), bytes = archive.len(), "Shapefile exported");
        Ok(path)
    }
}

#[async_trait]
impl Exporter for HttpExporter {
    async fn export_shapefile(&self) -> bool {
        match self.export().await {
            Ok(_) => true,
            Err(e) => {
                error!(error = ?e, "Shapefile export failed");
                false
            }
        }
    }
}
