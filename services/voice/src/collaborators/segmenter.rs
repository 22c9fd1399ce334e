use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use geovoice_core::Segmenter;
use geovoice_core::collaborators::{SegmentationRequest, SegmentationResponse};
use reqwest::multipart::{Form, Part};
use tracing::{debug, instrument};

/// The segmentation backend's text-prompt endpoint.
pub struct HttpSegmenter {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSegmenter {
    pub fn new(client: reqwest::Client, backend_url: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}/api/segment-text", backend_url.trim_end_matches('/')),
        }
    }
}

fn form_for(request: SegmentationRequest) -> Result<Form> {
    let bounds = serde_json::to_string(&request.bounds).context("failed to encode bounds")?;
    let extension = match request.image.mime_type.as_str() {
        "image/jpeg" => "jpg",
        _ => "png",
    };
    let file = Part::bytes(request.image.bytes)
        .file_name(format!("view.{}", extension))
        .mime_str(&request.image.mime_type)
        .context("invalid image mime type")?;
    Ok(Form::new()
        .part("file", file)
        .text("text_prompt", request.prompt)
        .text("bounds", bounds))
}

#[async_trait]
impl Segmenter for HttpSegmenter {
    #[instrument(skip_all, fields(prompt = %request.prompt))]
    async fn segment(&self, request: SegmentationRequest) -> Result<SegmentationResponse> {
        let form = form_for(request)?;
        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .context("segmentation backend unreachable")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("segmentation backend returned {}: {}", status, body);
        }
        let parsed: SegmentationResponse = response
            .json()
            .await
            .context("malformed segmentation response")?;
        debug!(success = parsed.success, "Segmentation response received");
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint() {
        let segmenter = HttpSegmenter::new(reqwest::Client::new(), "http://localhost:8000/");
        assert_eq!(segmenter.endpoint, "http://localhost:8000/api/segment-text");
    }

    #[test]
    fn test_response_without_geojson_means_nothing_found() {
        let response: SegmentationResponse = serde_json::from_str(r#"{"success":true}"#).unwrap();
        assert!(response.success);
        assert!(response.into_features().is_empty());
    }
}
