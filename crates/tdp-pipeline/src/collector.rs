//! Source collector
//!
//! Pulls recent messages per channel from the messaging source, downloads
//! attached media into the partitioned media root, and writes one staging
//! batch per (channel, run-date). Collection is best-effort per unit of
//! work: a failed media download stages the message without an artifact,
//! and a failed channel never aborts the remaining channels.

use futures::{stream, StreamExt};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::source::{MediaKind, MessageSource, SourceError, SourceMessage};
use crate::staging::{self, StagedMessage, StagingError};

/// Result type for collector operations
pub type Result<T> = std::result::Result<T, CollectError>;

/// Errors collecting a channel
#[derive(Error, Debug)]
pub enum CollectError {
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    #[error("staging error: {0}")]
    Staging(#[from] StagingError),
}

/// Outcome of one collection run across all channels
#[derive(Debug, Clone, Default)]
pub struct CollectorReport {
    pub channels_succeeded: usize,
    pub channels_failed: usize,
    pub messages_staged: usize,
    pub media_downloaded: usize,
}

/// Collects messages and media from the external source into staging
pub struct Collector<S> {
    source: Arc<S>,
    staging_root: PathBuf,
    media_root: PathBuf,
    concurrency: usize,
}

impl<S: MessageSource + 'static> Collector<S> {
    /// Create a new collector
    pub fn new(source: S, staging_root: PathBuf, media_root: PathBuf, concurrency: usize) -> Self {
        Self {
            source: Arc::new(source),
            staging_root,
            media_root,
            concurrency: concurrency.max(1),
        }
    }

    /// Collect every configured channel with bounded concurrency.
    ///
    /// Each channel runs as its own unit of work; failures are logged and
    /// isolated so one unreachable channel cannot starve the rest.
    pub async fn collect_all(&self, channels: &[String], limit: usize) -> CollectorReport {
        info!(
            channels = channels.len(),
            limit, "Starting collection run"
        );

        let outcomes: Vec<(String, Result<ChannelOutcome>)> = stream::iter(channels.iter().cloned())
            .map(|channel| {
                let collector = self;
                async move {
                    let outcome = collector.collect(&channel, limit).await;
                    (channel, outcome)
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut report = CollectorReport::default();
        for (channel, outcome) in outcomes {
            match outcome {
                Ok(counts) => {
                    report.channels_succeeded += 1;
                    report.messages_staged += counts.messages;
                    report.media_downloaded += counts.media;
                },
                Err(e) => {
                    error!(channel = %channel, error = %e, "Channel collection failed");
                    report.channels_failed += 1;
                },
            }
        }

        info!(
            succeeded = report.channels_succeeded,
            failed = report.channels_failed,
            messages = report.messages_staged,
            media = report.media_downloaded,
            "Collection run completed"
        );

        report
    }

    /// Collect up to `limit` recent messages from one channel and write the
    /// staging batch for today's run-date.
    pub async fn collect(&self, channel_name: &str, limit: usize) -> Result<ChannelOutcome> {
        self.source.authenticate().await?;
        let channel = self.source.resolve_channel(channel_name).await?;
        let messages = self.source.fetch_messages(&channel, limit).await?;

        info!(
            channel = %channel_name,
            fetched = messages.len(),
            "Fetched messages from source"
        );

        let mut staged = Vec::with_capacity(messages.len());
        let mut media_count = 0;

        for message in messages {
            let media_path = match self.download_media_for(channel_name, &message).await {
                Ok(Some(path)) => {
                    media_count += 1;
                    Some(path)
                },
                Ok(None) => None,
                Err(e) => {
                    // Message is still staged; the artifact is just absent.
                    warn!(
                        channel = %channel_name,
                        message_id = message.id,
                        error = %e,
                        "Media download failed"
                    );
                    None
                },
            };

            staged.push(to_staged(channel_name, &message, media_path));
        }

        let run_date = chrono::Utc::now().date_naive();
        let batch_file = staging::batch_path(&self.staging_root, run_date, channel_name);
        staging::write_batch(&batch_file, &staged)?;

        info!(
            channel = %channel_name,
            records = staged.len(),
            path = %batch_file.display(),
            "Staged collection batch"
        );

        Ok(ChannelOutcome {
            messages: staged.len(),
            media: media_count,
        })
    }

    /// Download the message's media artifact, if it has downloadable media.
    /// Returns the artifact path recorded into the staging batch.
    async fn download_media_for(
        &self,
        channel_name: &str,
        message: &SourceMessage,
    ) -> Result<Option<String>> {
        let Some(ref media) = message.media else {
            return Ok(None);
        };

        if media.kind == MediaKind::Other {
            return Ok(None);
        }

        let dest = staging::media_artifact_path(
            &self.media_root,
            channel_name,
            message.id,
            message.date,
            media.extension(),
        );

        self.source.download_media(media, &dest).await?;

        Ok(Some(dest.to_string_lossy().into_owned()))
    }
}

/// Per-channel collection counts
#[derive(Debug, Clone, Copy)]
pub struct ChannelOutcome {
    pub messages: usize,
    pub media: usize,
}

fn to_staged(channel_name: &str, message: &SourceMessage, media_path: Option<String>) -> StagedMessage {
    StagedMessage {
        message_id: message.id,
        channel_name: channel_name.to_string(),
        message_text: message.text.clone(),
        message_date: Some(message.date),
        has_media: message.media.is_some(),
        media_type: message.media.as_ref().map(|m| m.kind.as_tag().to_string()),
        media_path,
        scraped_at: chrono::Utc::now(),
        raw_data: json!({
            "views": message.views,
            "forwards": message.forwards,
            "replies": message.replies,
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::source::{ChannelHandle, MediaDescriptor};
    use async_trait::async_trait;
    use chrono::DateTime;
    use std::path::Path;

    struct FakeSource {
        messages: Vec<SourceMessage>,
        unknown_channels: Vec<String>,
        fail_downloads: bool,
    }

    impl FakeSource {
        fn with_messages(messages: Vec<SourceMessage>) -> Self {
            Self {
                messages,
                unknown_channels: Vec::new(),
                fail_downloads: false,
            }
        }
    }

    #[async_trait]
    impl MessageSource for FakeSource {
        async fn authenticate(&self) -> crate::source::Result<()> {
            Ok(())
        }

        async fn resolve_channel(&self, name: &str) -> crate::source::Result<ChannelHandle> {
            if self.unknown_channels.iter().any(|c| c == name) {
                return Err(SourceError::ChannelNotFound(name.to_string()));
            }
            Ok(ChannelHandle {
                id: 1,
                name: name.to_string(),
                title: None,
            })
        }

        async fn fetch_messages(
            &self,
            _channel: &ChannelHandle,
            limit: usize,
        ) -> crate::source::Result<Vec<SourceMessage>> {
            Ok(self.messages.iter().take(limit).cloned().collect())
        }

        async fn download_media(
            &self,
            media: &MediaDescriptor,
            dest: &Path,
        ) -> crate::source::Result<()> {
            if self.fail_downloads {
                return Err(SourceError::MediaUnavailable(media.file_id.clone()));
            }
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(dest, b"imagebytes")?;
            Ok(())
        }
    }

    fn message(id: i64, text: &str, with_photo: bool) -> SourceMessage {
        SourceMessage {
            id,
            text: Some(text.to_string()),
            date: DateTime::from_timestamp(1_662_371_829, 0).unwrap(),
            media: with_photo.then(|| MediaDescriptor {
                file_id: format!("file{}", id),
                kind: MediaKind::Photo,
                mime_type: None,
            }),
            views: 3,
            forwards: 1,
            replies: 0,
        }
    }

    #[tokio::test]
    async fn test_collect_stages_all_messages_and_downloads_media() {
        let dir = tempfile::tempdir().unwrap();
        let source = FakeSource::with_messages(vec![
            message(3, "third", true),
            message(2, "second", false),
            message(1, "first", false),
        ]);
        let collector = Collector::new(
            source,
            dir.path().join("staging"),
            dir.path().join("media"),
            2,
        );

        let outcome = collector.collect("CheMed123", 100).await.unwrap();
        assert_eq!(outcome.messages, 3);
        assert_eq!(outcome.media, 1);

        let run_date = chrono::Utc::now().date_naive();
        let batch = staging::batch_path(&dir.path().join("staging"), run_date, "CheMed123");
        let records = staging::read_batch(&batch).unwrap();
        assert_eq!(records.len(), 3);

        let with_media = records.iter().find(|r| r.message_id == 3).unwrap();
        assert!(with_media.has_media);
        assert_eq!(with_media.media_type.as_deref(), Some("photo"));
        let artifact = with_media.media_path.as_ref().unwrap();
        assert!(artifact.ends_with("CheMed123/2022-09-05/3_1662371829.jpg"));
        assert!(Path::new(artifact).exists());

        let without_media = records.iter().find(|r| r.message_id == 2).unwrap();
        assert!(!without_media.has_media);
        assert!(without_media.media_path.is_none());
    }

    #[tokio::test]
    async fn test_download_failure_still_stages_message() {
        let dir = tempfile::tempdir().unwrap();
        let source = FakeSource {
            fail_downloads: true,
            ..FakeSource::with_messages(vec![message(7, "photo post", true)])
        };
        let collector = Collector::new(
            source,
            dir.path().join("staging"),
            dir.path().join("media"),
            1,
        );

        let outcome = collector.collect("CheMed123", 100).await.unwrap();
        assert_eq!(outcome.messages, 1);
        assert_eq!(outcome.media, 0);

        let run_date = chrono::Utc::now().date_naive();
        let batch = staging::batch_path(&dir.path().join("staging"), run_date, "CheMed123");
        let records = staging::read_batch(&batch).unwrap();
        assert!(records[0].has_media);
        assert!(records[0].media_path.is_none());
    }

    #[tokio::test]
    async fn test_failed_channel_does_not_abort_others() {
        let dir = tempfile::tempdir().unwrap();
        let source = FakeSource {
            unknown_channels: vec!["gone".to_string()],
            ..FakeSource::with_messages(vec![message(1, "hello", false)])
        };
        let collector = Collector::new(
            source,
            dir.path().join("staging"),
            dir.path().join("media"),
            2,
        );

        let report = collector
            .collect_all(&["gone".to_string(), "CheMed123".to_string()], 100)
            .await;

        assert_eq!(report.channels_failed, 1);
        assert_eq!(report.channels_succeeded, 1);
        assert_eq!(report.messages_staged, 1);
    }
}
