//! Detection enrichment
//!
//! Scans media artifacts on disk, runs an object-detection model over the
//! ones not yet processed, and persists detection records correlated back to
//! the owning message. The per-artifact marker in `raw.enrichment_state`
//! distinguishes "processed with zero detections" from "not yet processed",
//! and its primary key turns concurrent-sweep races into enforced conflicts.

pub mod detector;
pub mod sweeper;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

pub use detector::HttpDetector;
pub use sweeper::{Enricher, SweepReport};

/// Result type for enrichment operations
pub type Result<T> = std::result::Result<T, EnrichError>;

/// Errors during enrichment
#[derive(Error, Debug)]
pub enum EnrichError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("model inference failed: {0}")]
    Inference(String),

    #[error("enrichment sweep already in progress")]
    SweepInProgress,
}

/// One detected object in an artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub class_id: i64,
    pub class_name: String,
    /// Confidence score in [0, 1]
    pub confidence: f64,
    /// Bounding box as xyxy coordinates
    pub bbox: [f64; 4],
}

/// Seam to the object-detection model; stateless per call
#[async_trait]
pub trait ObjectDetector: Send + Sync {
    /// Run detection over the image, returning zero or more detections
    async fn infer(&self, image_path: &Path) -> Result<Vec<Detection>>;
}

/// Extensions treated as image artifacts by the sweep
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff"];

/// Whether the path looks like an image artifact
pub(crate) fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.iter().any(|known| *known == ext)
        })
        .unwrap_or(false)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_image_extension_filter() {
        assert!(is_image_file(&PathBuf::from("a/482913_1662371829.jpg")));
        assert!(is_image_file(&PathBuf::from("b/3_99.PNG")));
        assert!(is_image_file(&PathBuf::from("c/5_1.tiff")));
        assert!(!is_image_file(&PathBuf::from("d/7_2.mp4")));
        assert!(!is_image_file(&PathBuf::from("e/batch.json")));
        assert!(!is_image_file(&PathBuf::from("f/no_extension")));
    }
}
