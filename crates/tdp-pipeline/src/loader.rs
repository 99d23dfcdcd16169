//! Warehouse loader
//!
//! Merges staging batches into `raw.telegram_messages` with an
//! ignore-on-conflict policy keyed on `(channel_name, message_id)`:
//! replaying a batch, or loading overlapping batches from adjacent runs,
//! inserts each message at most once. Records that carry a downloaded
//! artifact also land a correlation row in `raw.media_artifacts`.
//!
//! Failure isolation is per file: a malformed batch aborts that file's load
//! with a logged error and the remaining files still load.

use sqlx::PgPool;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info};
use walkdir::WalkDir;

use crate::staging::{self, StagedMessage, StagingError};
use crate::warehouse;

/// Result type for loader operations
pub type Result<T> = std::result::Result<T, LoadError>;

/// Errors loading staged batches
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("staging error: {0}")]
    Staging(#[from] StagingError),
}

/// Outcome of one load run
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub files_loaded: usize,
    pub files_failed: usize,
    pub rows_inserted: usize,
    pub rows_skipped: usize,
    pub artifacts_recorded: usize,
}

/// Per-file load counts
#[derive(Debug, Clone, Copy, Default)]
struct FileCounts {
    inserted: usize,
    skipped: usize,
    artifacts: usize,
}

/// Loads staging batches into raw storage
pub struct WarehouseLoader {
    db: PgPool,
    staging_root: PathBuf,
}

impl WarehouseLoader {
    /// Create a new loader
    pub fn new(db: PgPool, staging_root: PathBuf) -> Self {
        Self { db, staging_root }
    }

    /// Idempotent schema creation; must run before any insert
    pub async fn ensure_schema(&self) -> Result<()> {
        warehouse::ensure_raw_schema(&self.db).await?;
        Ok(())
    }

    /// Load every staged batch under the staging root.
    ///
    /// Schema creation failure escalates (node precondition); per-file
    /// failures are logged and isolated.
    pub async fn load_all(&self) -> Result<LoadReport> {
        self.ensure_schema().await?;

        let files = staged_files(&self.staging_root);
        info!(files = files.len(), "Starting warehouse load");

        let mut report = LoadReport::default();
        for file in files {
            match self.load_file(&file).await {
                Ok(counts) => {
                    report.files_loaded += 1;
                    report.rows_inserted += counts.inserted;
                    report.rows_skipped += counts.skipped;
                    report.artifacts_recorded += counts.artifacts;
                },
                Err(e) => {
                    error!(path = %file.display(), error = %e, "Failed to load staged batch");
                    report.files_failed += 1;
                },
            }
        }

        info!(
            loaded = report.files_loaded,
            failed = report.files_failed,
            inserted = report.rows_inserted,
            skipped = report.rows_skipped,
            "Warehouse load completed"
        );

        Ok(report)
    }

    /// Load a single staging batch
    async fn load_file(&self, path: &Path) -> Result<FileCounts> {
        let records = staging::read_batch(path)?;

        let mut counts = FileCounts::default();
        for record in &records {
            if self.insert_message(record).await? {
                counts.inserted += 1;
            } else {
                counts.skipped += 1;
            }

            if record.media_path.is_some() {
                if self.record_artifact(record).await? {
                    counts.artifacts += 1;
                }
            }
        }

        info!(
            path = %path.display(),
            inserted = counts.inserted,
            skipped = counts.skipped,
            "Loaded staged batch"
        );

        Ok(counts)
    }

    /// Insert one message; returns false when the `(channel_name, message_id)`
    /// pair already exists and the insert resolved to a no-op.
    async fn insert_message(&self, record: &StagedMessage) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO raw.telegram_messages
                (message_id, channel_name, message_text, message_date,
                 has_media, media_type, scraped_at, raw_data)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (channel_name, message_id) DO NOTHING
            "#,
        )
        .bind(record.message_id)
        .bind(&record.channel_name)
        .bind(&record.message_text)
        .bind(record.message_date)
        .bind(record.has_media)
        .bind(&record.media_type)
        .bind(record.scraped_at)
        .bind(&record.raw_data)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Record the explicit artifact-to-message correlation row
    async fn record_artifact(&self, record: &StagedMessage) -> Result<bool> {
        let Some(ref artifact_path) = record.media_path else {
            return Ok(false);
        };

        let result = sqlx::query(
            r#"
            INSERT INTO raw.media_artifacts (artifact_path, channel_name, message_id, downloaded_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (artifact_path) DO NOTHING
            "#,
        )
        .bind(artifact_path)
        .bind(&record.channel_name)
        .bind(record.message_id)
        .bind(record.scraped_at)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Discover staged batch files under the staging root, stable order
fn staged_files(staging_root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(staging_root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case("json"))
                .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    files
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_staged_files_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("2022-09-06")).unwrap();
        std::fs::create_dir_all(root.join("2022-09-05")).unwrap();
        std::fs::write(root.join("2022-09-06/beta.json"), b"[]").unwrap();
        std::fs::write(root.join("2022-09-05/alpha.json"), b"[]").unwrap();
        std::fs::write(root.join("2022-09-05/notes.txt"), b"ignored").unwrap();

        let files = staged_files(root);
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("2022-09-05/alpha.json"));
        assert!(files[1].ends_with("2022-09-06/beta.json"));
    }

    #[test]
    fn test_staged_files_empty_root() {
        let dir = tempfile::tempdir().unwrap();
        assert!(staged_files(&dir.path().join("missing")).is_empty());
    }
}
