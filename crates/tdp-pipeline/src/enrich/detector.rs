//! HTTP object-detection client
//!
//! Posts the artifact bytes to a YOLO inference service and parses the
//! returned detections. The service is stateless per call; any transport or
//! decoding failure surfaces as a model-inference error, which the sweep
//! logs and skips past.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use super::{Detection, EnrichError, ObjectDetector, Result};
use crate::config::DetectorConfig;

/// Client for an HTTP object-detection service
pub struct HttpDetector {
    http: reqwest::Client,
    endpoint: String,
}

/// Inference service response body
#[derive(Debug, Deserialize)]
struct InferResponse {
    #[serde(default)]
    detections: Vec<Detection>,
}

impl HttpDetector {
    /// Create a new detector client from configuration
    pub fn new(config: &DetectorConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
        })
    }
}

#[async_trait]
impl ObjectDetector for HttpDetector {
    async fn infer(&self, image_path: &Path) -> Result<Vec<Detection>> {
        let bytes = tokio::fs::read(image_path).await?;

        let file_name = image_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());

        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name);
        let form = reqwest::multipart::Form::new().part("image", part);

        let response = self
            .http
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| EnrichError::Inference(e.to_string()))?
            .error_for_status()
            .map_err(|e| EnrichError::Inference(e.to_string()))?;

        let parsed: InferResponse = response
            .json()
            .await
            .map_err(|e| EnrichError::Inference(e.to_string()))?;

        debug!(
            path = %image_path.display(),
            detections = parsed.detections.len(),
            "Inference completed"
        );

        Ok(parsed.detections)
    }
}
