//! Enrichment sweep
//!
//! One sweep walks every image artifact under the media root and enriches
//! the ones without a processing marker. Per artifact:
//!
//! 1. skip check against `raw.enrichment_state` (`done`/`orphaned` skip,
//!    `failed` retries)
//! 2. correlation to the owning message, preferring the explicit
//!    `raw.media_artifacts` row and falling back to filename parsing
//! 3. inference through the [`ObjectDetector`] seam
//! 4. atomic persistence: the state marker and all detection rows for the
//!    artifact commit in one transaction, and the marker's primary key
//!    resolves concurrent sweeps to a single winner
//!
//! Sweeps are additionally single-flight within a process: an overlapping
//! sweep returns [`EnrichError::SweepInProgress`] without scanning.

use sqlx::PgPool;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use walkdir::WalkDir;

use tdp_common::correlation::message_id_from_path;

use super::{is_image_file, Detection, EnrichError, ObjectDetector, Result};
use crate::warehouse;

/// Outcome of one enrichment sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub enriched: usize,
    pub detections: usize,
    pub skipped: usize,
    pub orphaned: usize,
    pub failed: usize,
}

/// What happened to a single artifact
enum ArtifactOutcome {
    Enriched(usize),
    Skipped,
    Orphaned,
    Failed,
}

/// Enriches media artifacts with object-detection records
pub struct Enricher<D> {
    db: PgPool,
    media_root: PathBuf,
    detector: D,
    sweep_lock: Mutex<()>,
}

impl<D: ObjectDetector> Enricher<D> {
    /// Create a new enricher
    pub fn new(db: PgPool, media_root: PathBuf, detector: D) -> Self {
        Self {
            db,
            media_root,
            detector,
            sweep_lock: Mutex::new(()),
        }
    }

    /// Run one full sweep over the media root.
    ///
    /// Returns [`EnrichError::SweepInProgress`] if another sweep holds the
    /// single-flight lock; callers treat that as a benign no-op.
    pub async fn sweep(&self) -> Result<SweepReport> {
        let _guard = self
            .sweep_lock
            .try_lock()
            .map_err(|_| EnrichError::SweepInProgress)?;

        warehouse::ensure_raw_schema(&self.db).await?;

        let artifacts = self.image_artifacts();
        info!(
            artifacts = artifacts.len(),
            root = %self.media_root.display(),
            "Starting enrichment sweep"
        );

        let mut report = SweepReport {
            scanned: artifacts.len(),
            ..Default::default()
        };

        for artifact in artifacts {
            match self.process_artifact(&artifact).await {
                Ok(ArtifactOutcome::Enriched(count)) => {
                    report.enriched += 1;
                    report.detections += count;
                },
                Ok(ArtifactOutcome::Skipped) => report.skipped += 1,
                Ok(ArtifactOutcome::Orphaned) => report.orphaned += 1,
                Ok(ArtifactOutcome::Failed) => report.failed += 1,
                Err(e) => {
                    // One bad artifact never aborts the sweep.
                    error!(path = %artifact.display(), error = %e, "Artifact enrichment failed");
                    report.failed += 1;
                },
            }
        }

        info!(
            enriched = report.enriched,
            detections = report.detections,
            skipped = report.skipped,
            orphaned = report.orphaned,
            failed = report.failed,
            "Enrichment sweep completed"
        );

        Ok(report)
    }

    /// Recursive, extension-filtered scan of the media root
    fn image_artifacts(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(&self.media_root)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| is_image_file(entry.path()))
            .map(|entry| entry.into_path())
            .collect();
        files.sort();
        files
    }

    async fn process_artifact(&self, path: &Path) -> Result<ArtifactOutcome> {
        let path_str = path.to_string_lossy().into_owned();

        // 1. Skip check. A `failed` marker is retried, not skipped.
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM raw.enrichment_state WHERE image_path = $1")
                .bind(&path_str)
                .fetch_optional(&self.db)
                .await?;

        if matches!(status.as_deref(), Some("done") | Some("orphaned")) {
            return Ok(ArtifactOutcome::Skipped);
        }

        // 2. Correlation.
        let message_id = match self.correlate(&path_str, path).await? {
            Some(id) => id,
            None => {
                warn!(path = %path_str, "No message id for artifact, marking orphaned");
                self.mark_status(&path_str, "orphaned", None).await?;
                return Ok(ArtifactOutcome::Orphaned);
            },
        };

        // 3. Detection.
        let detections = match self.detector.infer(path).await {
            Ok(detections) => detections,
            Err(e) => {
                warn!(path = %path_str, error = %e, "Inference failed, marking for retry");
                self.mark_status(&path_str, "failed", Some(message_id)).await?;
                return Ok(ArtifactOutcome::Failed);
            },
        };

        // 4. Atomic persistence.
        if !self.persist(&path_str, message_id, &detections).await? {
            // A concurrent sweep claimed this artifact first.
            return Ok(ArtifactOutcome::Skipped);
        }

        info!(
            path = %path_str,
            message_id,
            detections = detections.len(),
            "Artifact enriched"
        );

        Ok(ArtifactOutcome::Enriched(detections.len()))
    }

    /// Resolve the owning message id: explicit correlation row first,
    /// filename parsing as the fallback. `None` means the artifact cannot be
    /// correlated and is recorded as orphaned.
    async fn correlate(&self, path_str: &str, path: &Path) -> Result<Option<i64>> {
        let recorded: Option<i64> =
            sqlx::query_scalar("SELECT message_id FROM raw.media_artifacts WHERE artifact_path = $1")
                .bind(path_str)
                .fetch_optional(&self.db)
                .await?;

        if recorded.is_some() {
            return Ok(recorded);
        }

        match message_id_from_path(path) {
            Ok(id) => Ok(Some(id)),
            Err(e) => {
                warn!(path = %path_str, error = %e, "Correlation failed");
                Ok(None)
            },
        }
    }

    /// Write the processing marker and every detection row in one
    /// transaction. Returns false when the marker insert affected no rows,
    /// i.e. a concurrent sweep already processed the artifact.
    async fn persist(
        &self,
        path_str: &str,
        message_id: i64,
        detections: &[Detection],
    ) -> Result<bool> {
        let mut tx = self.db.begin().await?;

        let claimed = sqlx::query(
            r#"
            INSERT INTO raw.enrichment_state (image_path, status, message_id, detections_found)
            VALUES ($1, 'done', $2, $3)
            ON CONFLICT (image_path) DO UPDATE
                SET status = 'done',
                    message_id = EXCLUDED.message_id,
                    detections_found = EXCLUDED.detections_found,
                    processed_at = CURRENT_TIMESTAMP
                WHERE raw.enrichment_state.status = 'failed'
            "#,
        )
        .bind(path_str)
        .bind(message_id)
        .bind(detections.len() as i32)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if claimed == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        for detection in detections {
            sqlx::query(
                r#"
                INSERT INTO raw.image_detections
                    (message_id, image_path, detected_class, confidence_score, bbox_coordinates)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(message_id)
            .bind(path_str)
            .bind(&detection.class_name)
            .bind(detection.confidence)
            .bind(serde_json::json!(detection.bbox))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    /// Upsert a non-terminal marker outside the detection transaction
    async fn mark_status(
        &self,
        path_str: &str,
        status: &str,
        message_id: Option<i64>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO raw.enrichment_state (image_path, status, message_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (image_path) DO UPDATE
                SET status = EXCLUDED.status,
                    message_id = EXCLUDED.message_id,
                    processed_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(path_str)
        .bind(status)
        .bind(message_id)
        .execute(&self.db)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct NullDetector;

    #[async_trait]
    impl ObjectDetector for NullDetector {
        async fn infer(&self, _image_path: &Path) -> Result<Vec<Detection>> {
            Ok(Vec::new())
        }
    }

    fn lazy_pool() -> PgPool {
        PgPool::connect_lazy("postgresql://localhost/tdp_test").unwrap()
    }

    #[tokio::test]
    async fn test_overlapping_sweep_is_single_flight() {
        let dir = tempfile::tempdir().unwrap();
        let enricher = Enricher::new(lazy_pool(), dir.path().to_path_buf(), NullDetector);

        let _held = enricher.sweep_lock.try_lock().unwrap();
        let err = enricher.sweep().await.unwrap_err();
        assert!(matches!(err, EnrichError::SweepInProgress));
    }

    #[tokio::test]
    async fn test_image_artifacts_scan_is_filtered_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("media");
        std::fs::create_dir_all(root.join("CheMed123/2022-09-05")).unwrap();
        std::fs::write(root.join("CheMed123/2022-09-05/2_1662371829.jpg"), b"x").unwrap();
        std::fs::write(root.join("CheMed123/2022-09-05/1_1662371000.png"), b"x").unwrap();
        std::fs::write(root.join("CheMed123/2022-09-05/9_1662371999.mp4"), b"x").unwrap();

        let enricher = Enricher::new(lazy_pool(), root.clone(), NullDetector);
        let artifacts = enricher.image_artifacts();

        assert_eq!(artifacts.len(), 2);
        assert!(artifacts[0].ends_with("1_1662371000.png"));
        assert!(artifacts[1].ends_with("2_1662371829.jpg"));
    }
}
