//! Messaging source seam
//!
//! The collector talks to the external messaging system exclusively through
//! the [`MessageSource`] trait: authenticate, resolve a channel, fetch a
//! bounded batch of recent messages, download media. Production uses the
//! Telegram Bot API implementation in [`telegram`]; tests substitute an
//! in-memory source.

pub mod telegram;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

pub use telegram::TelegramSource;

/// Result type for source operations
pub type Result<T> = std::result::Result<T, SourceError>;

/// Errors talking to the messaging source.
///
/// All of these are transient from the pipeline's point of view: the failed
/// unit of work is logged and skipped, and the next scheduled run retries.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("source API rejected {method}: {description}")]
    Api { method: String, description: String },

    #[error("channel not found: {0}")]
    ChannelNotFound(String),

    #[error("media has no downloadable content: {0}")]
    MediaUnavailable(String),
}

/// Resolved handle for a logical channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelHandle {
    /// Source-side numeric id
    pub id: i64,
    /// Logical channel name as configured
    pub name: String,
    /// Display title, when the source provides one
    pub title: Option<String>,
}

/// Kind of media attached to a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Document,
    Other,
}

impl MediaKind {
    /// Tag stored in the `media_type` column
    pub fn as_tag(self) -> &'static str {
        match self {
            MediaKind::Photo => "photo",
            MediaKind::Document => "document",
            MediaKind::Other => "other",
        }
    }
}

/// Downloadable media attached to a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaDescriptor {
    /// Source-side opaque file reference
    pub file_id: String,
    pub kind: MediaKind,
    /// Declared MIME type, when the source provides one
    pub mime_type: Option<String>,
}

impl MediaDescriptor {
    /// File extension for the artifact, derived from the declared MIME type
    /// with a fallback to empty. Photos default to `.jpg`.
    pub fn extension(&self) -> &'static str {
        if self.kind == MediaKind::Photo {
            return ".jpg";
        }
        match self.mime_type.as_deref() {
            Some(mime) if mime.contains("image/jpeg") => ".jpg",
            Some(mime) if mime.contains("image/png") => ".png",
            Some(mime) if mime.contains("video") => ".mp4",
            _ => "",
        }
    }
}

/// One message as delivered by the source
#[derive(Debug, Clone)]
pub struct SourceMessage {
    pub id: i64,
    pub text: Option<String>,
    pub date: DateTime<Utc>,
    pub media: Option<MediaDescriptor>,
    pub views: i64,
    pub forwards: i64,
    pub replies: i64,
}

/// Seam to the external messaging system
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Verify the session credentials are usable
    async fn authenticate(&self) -> Result<()>;

    /// Resolve a logical channel name to a source handle
    async fn resolve_channel(&self, name: &str) -> Result<ChannelHandle>;

    /// Fetch up to `limit` most-recent messages, newest first as delivered
    /// by the source
    async fn fetch_messages(&self, channel: &ChannelHandle, limit: usize)
        -> Result<Vec<SourceMessage>>;

    /// Download the media payload to `dest`
    async fn download_media(&self, media: &MediaDescriptor, dest: &Path) -> Result<()>;
}
