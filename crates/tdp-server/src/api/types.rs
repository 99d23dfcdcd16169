//! API response types

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Query parameters carrying an optional row limit
#[derive(Debug, Deserialize)]
pub struct LimitParams {
    pub limit: Option<i64>,
}

impl LimitParams {
    /// Clamp the requested limit into [1, max], defaulting to `default`
    pub fn clamped(&self, default: i64, max: i64) -> i64 {
        self.limit.unwrap_or(default).clamp(1, max)
    }
}

/// Query parameters for message search
#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub query: String,
    pub limit: Option<i64>,
}

/// One frequently mentioned product keyword
#[derive(Debug, Serialize, FromRow)]
pub struct TopProduct {
    pub product_name: String,
    pub mention_count: i64,
    pub channel_count: i64,
}

/// Posting activity for one channel
#[derive(Debug, Serialize, FromRow)]
pub struct ChannelActivity {
    pub channel_name: String,
    pub total_messages: i64,
    pub messages_with_media: i64,
    pub avg_message_length: Option<f64>,
    pub first_message_date: Option<DateTime<Utc>>,
    pub last_message_date: Option<DateTime<Utc>>,
    pub avg_daily_messages: f64,
}

/// One message search hit
#[derive(Debug, Serialize, FromRow)]
pub struct MessageSearchResult {
    pub message_id: i64,
    pub channel_name: String,
    pub message_text: Option<String>,
    pub date_day: Option<NaiveDate>,
    pub has_media: bool,
    pub detection_count: i64,
}

/// Warehouse-wide totals
#[derive(Debug, Serialize, FromRow)]
pub struct OverviewStats {
    pub total_channels: i64,
    pub total_messages: i64,
    pub messages_with_media: i64,
    pub total_detections: i64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_clamping() {
        assert_eq!(LimitParams { limit: None }.clamped(10, 100), 10);
        assert_eq!(LimitParams { limit: Some(5) }.clamped(10, 100), 5);
        assert_eq!(LimitParams { limit: Some(0) }.clamped(10, 100), 1);
        assert_eq!(LimitParams { limit: Some(500) }.clamped(10, 100), 100);
    }

    #[test]
    fn test_top_product_serializes() {
        let product = TopProduct {
            product_name: "paracetamol".to_string(),
            mention_count: 42,
            channel_count: 3,
        };
        let value = serde_json::to_value(&product).unwrap();
        assert_eq!(value["product_name"], "paracetamol");
        assert_eq!(value["mention_count"], 42);
    }
}
