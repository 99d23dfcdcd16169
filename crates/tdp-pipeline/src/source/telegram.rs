//! Telegram Bot API message source
//!
//! Speaks the Bot HTTP API with `reqwest`. The collector bot is an admin of
//! the configured channels, so channel posts arrive on its update queue;
//! `fetch_messages` drains that queue and filters per channel. Media bytes
//! are fetched via `getFile` and streamed to disk.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

use super::{
    ChannelHandle, MediaDescriptor, MediaKind, MessageSource, Result, SourceError, SourceMessage,
};
use crate::config::TelegramConfig;

/// Telegram Bot API client
pub struct TelegramSource {
    http: reqwest::Client,
    api_base: String,
    token: String,
}

/// Standard Bot API response envelope
#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct Me {
    id: i64,
    #[serde(default)]
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PhotoSize {
    file_id: String,
}

#[derive(Debug, Deserialize)]
struct Document {
    file_id: String,
    #[serde(default)]
    mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChannelPost {
    message_id: i64,
    date: i64,
    chat: Chat,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    caption: Option<String>,
    #[serde(default)]
    photo: Option<Vec<PhotoSize>>,
    #[serde(default)]
    document: Option<Document>,
    #[serde(default)]
    views: Option<i64>,
    #[serde(default)]
    forwards: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Update {
    #[allow(dead_code)]
    update_id: i64,
    #[serde(default)]
    channel_post: Option<ChannelPost>,
}

#[derive(Debug, Deserialize)]
struct RemoteFile {
    #[serde(default)]
    file_path: Option<String>,
}

impl TelegramSource {
    /// Create a new source from configuration
    pub fn new(config: &TelegramConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token: config.bot_token.clone(),
        }
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, query: &[(&str, String)]) -> Result<T> {
        let url = format!("{}/bot{}/{}", self.api_base, self.token, method);
        let response = self.http.get(&url).query(query).send().await?;
        let envelope: ApiEnvelope<T> = response.json().await?;

        if !envelope.ok {
            return Err(SourceError::Api {
                method: method.to_string(),
                description: envelope
                    .description
                    .unwrap_or_else(|| "no description".to_string()),
            });
        }

        envelope.result.ok_or_else(|| SourceError::Api {
            method: method.to_string(),
            description: "ok response without result".to_string(),
        })
    }

    fn to_source_message(post: ChannelPost) -> SourceMessage {
        let media = if let Some(sizes) = post.photo {
            // Sizes are ordered smallest to largest; keep the largest.
            sizes.into_iter().last().map(|size| MediaDescriptor {
                file_id: size.file_id,
                kind: MediaKind::Photo,
                mime_type: None,
            })
        } else {
            post.document.map(|doc| MediaDescriptor {
                file_id: doc.file_id,
                kind: MediaKind::Document,
                mime_type: doc.mime_type,
            })
        };

        let date = DateTime::<Utc>::from_timestamp(post.date, 0).unwrap_or_else(Utc::now);

        SourceMessage {
            id: post.message_id,
            text: post.text.or(post.caption),
            date,
            media,
            views: post.views.unwrap_or(0),
            forwards: post.forwards.unwrap_or(0),
            replies: 0,
        }
    }
}

#[async_trait]
impl MessageSource for TelegramSource {
    async fn authenticate(&self) -> Result<()> {
        let me: Me = self.call("getMe", &[]).await?;
        debug!(bot_id = me.id, username = ?me.username, "Authenticated to Telegram");
        Ok(())
    }

    async fn resolve_channel(&self, name: &str) -> Result<ChannelHandle> {
        let chat: Chat = self
            .call("getChat", &[("chat_id", format!("@{}", name))])
            .await
            .map_err(|err| match err {
                SourceError::Api { .. } => SourceError::ChannelNotFound(name.to_string()),
                other => other,
            })?;

        Ok(ChannelHandle {
            id: chat.id,
            name: name.to_string(),
            title: chat.title.or(chat.username),
        })
    }

    async fn fetch_messages(
        &self,
        channel: &ChannelHandle,
        limit: usize,
    ) -> Result<Vec<SourceMessage>> {
        let updates: Vec<Update> = self
            .call(
                "getUpdates",
                &[
                    ("allowed_updates", r#"["channel_post"]"#.to_string()),
                    ("limit", "100".to_string()),
                ],
            )
            .await?;

        // Updates arrive oldest first; deliver newest first, bounded by limit.
        let mut messages: Vec<SourceMessage> = updates
            .into_iter()
            .filter_map(|update| update.channel_post)
            .filter(|post| post.chat.id == channel.id)
            .map(Self::to_source_message)
            .collect();
        messages.reverse();
        messages.truncate(limit);

        Ok(messages)
    }

    async fn download_media(&self, media: &MediaDescriptor, dest: &Path) -> Result<()> {
        let remote: RemoteFile = self
            .call("getFile", &[("file_id", media.file_id.clone())])
            .await?;

        let file_path = remote
            .file_path
            .ok_or_else(|| SourceError::MediaUnavailable(media.file_id.clone()))?;

        let url = format!("{}/file/bot{}/{}", self.api_base, self.token, file_path);
        let response = self.http.get(&url).send().await?.error_for_status()?;

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = std::fs::File::create(dest)?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            std::io::Write::write_all(&mut file, &chunk)?;
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source_for(server: &MockServer) -> TelegramSource {
        TelegramSource::new(&TelegramConfig {
            api_base: server.uri(),
            bot_token: "token".to_string(),
        })
    }

    #[tokio::test]
    async fn test_resolve_channel() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bottoken/getChat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {"id": -1001234, "title": "Che Med", "username": "CheMed123"}
            })))
            .mount(&server)
            .await;

        let handle = source_for(&server).resolve_channel("CheMed123").await.unwrap();
        assert_eq!(handle.id, -1001234);
        assert_eq!(handle.name, "CheMed123");
        assert_eq!(handle.title.as_deref(), Some("Che Med"));
    }

    #[tokio::test]
    async fn test_resolve_unknown_channel() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bottoken/getChat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": false,
                "description": "Bad Request: chat not found"
            })))
            .mount(&server)
            .await;

        let err = source_for(&server).resolve_channel("nope").await.unwrap_err();
        assert!(matches!(err, SourceError::ChannelNotFound(name) if name == "nope"));
    }

    #[tokio::test]
    async fn test_fetch_messages_filters_and_orders() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bottoken/getUpdates"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": [
                    {"update_id": 1, "channel_post": {
                        "message_id": 10, "date": 1662371000,
                        "chat": {"id": -1001234}, "text": "first"
                    }},
                    {"update_id": 2, "channel_post": {
                        "message_id": 99, "date": 1662371100,
                        "chat": {"id": -999}, "text": "other channel"
                    }},
                    {"update_id": 3, "channel_post": {
                        "message_id": 11, "date": 1662371829,
                        "chat": {"id": -1001234},
                        "photo": [{"file_id": "small"}, {"file_id": "big"}],
                        "views": 5
                    }}
                ]
            })))
            .mount(&server)
            .await;

        let channel = ChannelHandle {
            id: -1001234,
            name: "CheMed123".to_string(),
            title: None,
        };
        let messages = source_for(&server)
            .fetch_messages(&channel, 100)
            .await
            .unwrap();

        assert_eq!(messages.len(), 2);
        // Newest first
        assert_eq!(messages[0].id, 11);
        assert_eq!(messages[1].id, 10);
        // Largest photo size wins
        let media = messages[0].media.as_ref().unwrap();
        assert_eq!(media.file_id, "big");
        assert_eq!(media.kind, MediaKind::Photo);
        assert_eq!(messages[0].views, 5);
    }

    #[tokio::test]
    async fn test_download_media_writes_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bottoken/getFile"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {"file_id": "big", "file_path": "photos/file_0.jpg"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/file/bottoken/photos/file_0.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"jpegbytes".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("CheMed123/2022-09-05/11_1662371829.jpg");
        let media = MediaDescriptor {
            file_id: "big".to_string(),
            kind: MediaKind::Photo,
            mime_type: None,
        };

        source_for(&server).download_media(&media, &dest).await.unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"jpegbytes");
    }
}
