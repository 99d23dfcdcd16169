//! Staging batches
//!
//! One JSON file per (channel, run-date) holding the records collected in a
//! run. The staging file is the unit of replay for the loader: loading it
//! again is a no-op thanks to the warehouse conflict policy, so a batch can
//! be replayed after a partial or failed load.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for staging operations
pub type Result<T> = std::result::Result<T, StagingError>;

/// Errors reading or writing staging batches
#[derive(Error, Debug)]
pub enum StagingError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed staging batch: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// One collected message, as staged on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagedMessage {
    pub message_id: i64,
    pub channel_name: String,
    pub message_text: Option<String>,
    pub message_date: Option<DateTime<Utc>>,
    pub has_media: bool,
    pub media_type: Option<String>,
    /// Artifact path recorded at download time; the loader turns this into
    /// the explicit correlation row in `raw.media_artifacts`
    pub media_path: Option<String>,
    pub scraped_at: DateTime<Utc>,
    /// Opaque counters payload (views/forwards/replies)
    pub raw_data: serde_json::Value,
}

/// Path of the staging batch file for (channel, run-date)
pub fn batch_path(staging_root: &Path, run_date: NaiveDate, channel: &str) -> PathBuf {
    staging_root
        .join(run_date.format("%Y-%m-%d").to_string())
        .join(format!("{}.json", channel))
}

/// Path of a media artifact: `{root}/{channel}/{date}/{messageId}_{epochSeconds}{ext}`
pub fn media_artifact_path(
    media_root: &Path,
    channel: &str,
    message_id: i64,
    message_date: DateTime<Utc>,
    extension: &str,
) -> PathBuf {
    media_root
        .join(channel)
        .join(message_date.format("%Y-%m-%d").to_string())
        .join(format!(
            "{}_{}{}",
            message_id,
            message_date.timestamp(),
            extension
        ))
}

/// Write a staging batch, creating parent directories as needed
pub fn write_batch(path: &Path, records: &[StagedMessage]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)?;
    serde_json::to_writer_pretty(file, records)?;
    Ok(())
}

/// Read a staging batch back
pub fn read_batch(path: &Path) -> Result<Vec<StagedMessage>> {
    let file = std::fs::File::open(path)?;
    let records = serde_json::from_reader(file)?;
    Ok(records)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tdp_common::correlation::message_id_from_path;

    fn sample_message() -> StagedMessage {
        StagedMessage {
            message_id: 482913,
            channel_name: "CheMed123".to_string(),
            message_text: Some("paracetamol in stock".to_string()),
            message_date: DateTime::from_timestamp(1_662_371_829, 0),
            has_media: true,
            media_type: Some("photo".to_string()),
            media_path: Some("data/raw/media/CheMed123/2022-09-05/482913_1662371829.jpg".to_string()),
            scraped_at: Utc::now(),
            raw_data: serde_json::json!({"views": 10, "forwards": 2, "replies": 0}),
        }
    }

    #[test]
    fn test_batch_path_layout() {
        let date = NaiveDate::from_ymd_opt(2022, 9, 5).unwrap();
        let path = batch_path(Path::new("data/raw/telegram_messages"), date, "CheMed123");
        assert_eq!(
            path,
            PathBuf::from("data/raw/telegram_messages/2022-09-05/CheMed123.json")
        );
    }

    #[test]
    fn test_media_path_encodes_correlation_key() {
        let date = DateTime::from_timestamp(1_662_371_829, 0).unwrap();
        let path = media_artifact_path(Path::new("data/raw/media"), "CheMed123", 482913, date, ".jpg");
        assert_eq!(
            path,
            PathBuf::from("data/raw/media/CheMed123/2022-09-05/482913_1662371829.jpg")
        );
        // The filename must round back through the correlation parser.
        assert_eq!(message_id_from_path(&path).unwrap(), 482913);
    }

    #[test]
    fn test_write_then_read_batch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("2022-09-05/CheMed123.json");
        let records = vec![sample_message()];

        write_batch(&path, &records).unwrap();
        let loaded = read_batch(&path).unwrap();

        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].message_id, 482913);
        assert_eq!(loaded[0].channel_name, "CheMed123");
        assert_eq!(loaded[0].media_path, records[0].media_path);
    }

    #[test]
    fn test_read_malformed_batch_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, b"{\"not\": \"a list\"").unwrap();

        assert!(matches!(
            read_batch(&path),
            Err(StagingError::Malformed(_))
        ));
    }
}
