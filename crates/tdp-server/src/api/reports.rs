//! Report handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use super::types::{
    ChannelActivity, LimitParams, MessageSearchResult, OverviewStats, SearchParams, TopProduct,
};
use super::AppState;
use crate::error::{ApiResult, AppError};

/// Health check handler
pub async fn health_check(State(state): State<AppState>) -> Result<Response, StatusCode> {
    match sqlx::query("SELECT 1").fetch_one(&state.db).await {
        Ok(_) => Ok((
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "database": "connected"
            })),
        )
            .into_response()),
        Err(e) => {
            tracing::error!("Database health check failed: {:?}", e);
            Err(StatusCode::SERVICE_UNAVAILABLE)
        },
    }
}

/// Most frequently mentioned product keywords
pub async fn top_products(
    State(state): State<AppState>,
    Query(params): Query<LimitParams>,
) -> ApiResult<Json<Vec<TopProduct>>> {
    let limit = params.clamped(10, 100);

    let products = sqlx::query_as::<_, TopProduct>(
        r#"
        SELECT
            LOWER(TRIM(word)) AS product_name,
            COUNT(*) AS mention_count,
            COUNT(DISTINCT channel_id) AS channel_count
        FROM (
            SELECT
                UNNEST(STRING_TO_ARRAY(LOWER(message_text), ' ')) AS word,
                channel_id
            FROM marts.fct_messages
            WHERE message_text IS NOT NULL
        ) words
        WHERE LENGTH(word) > 3
            AND word ~ '^[a-z]+$'
            AND word IN ('paracetamol', 'aspirin', 'ibuprofen', 'amoxicillin',
                         'vitamin', 'medicine', 'drug', 'tablet', 'capsule', 'syrup')
        GROUP BY LOWER(TRIM(word))
        ORDER BY mention_count DESC
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(products))
}

/// Posting activity for one channel
pub async fn channel_activity(
    State(state): State<AppState>,
    Path(channel_name): Path<String>,
) -> ApiResult<Json<ChannelActivity>> {
    let activity = sqlx::query_as::<_, ChannelActivity>(
        r#"
        SELECT
            c.channel_name,
            c.total_messages,
            c.messages_with_media,
            c.avg_message_length::float8 AS avg_message_length,
            c.first_message_date,
            c.last_message_date,
            COALESCE(daily_stats.avg_daily_messages, 0)::float8 AS avg_daily_messages
        FROM marts.dim_channels c
        LEFT JOIN (
            SELECT
                channel_id,
                AVG(daily_count)::float8 AS avg_daily_messages
            FROM (
                SELECT channel_id, date_day, COUNT(*) AS daily_count
                FROM marts.fct_messages
                GROUP BY channel_id, date_day
            ) daily
            GROUP BY channel_id
        ) daily_stats ON c.channel_id = daily_stats.channel_id
        WHERE LOWER(c.channel_name) = LOWER($1)
        "#,
    )
    .bind(&channel_name)
    .fetch_optional(&state.db)
    .await?;

    activity
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Channel not found: {}", channel_name)))
}

/// Keyword search over curated messages
pub async fn search_messages(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<Vec<MessageSearchResult>>> {
    if params.query.trim().is_empty() {
        return Err(AppError::BadRequest("Search query cannot be empty".to_string()));
    }

    let limit = LimitParams {
        limit: params.limit,
    }
    .clamped(50, 200);

    let results = sqlx::query_as::<_, MessageSearchResult>(
        r#"
        SELECT
            m.message_id,
            c.channel_name,
            m.message_text,
            m.date_day,
            m.has_media,
            COALESCE(m.detection_count, 0)::bigint AS detection_count
        FROM marts.fct_messages m
        JOIN marts.dim_channels c ON m.channel_id = c.channel_id
        WHERE LOWER(m.message_text) LIKE LOWER($1)
        ORDER BY m.date_day DESC
        LIMIT $2
        "#,
    )
    .bind(format!("%{}%", params.query))
    .bind(limit)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(results))
}

/// Warehouse-wide totals
pub async fn overview_stats(State(state): State<AppState>) -> ApiResult<Json<OverviewStats>> {
    let stats = sqlx::query_as::<_, OverviewStats>(
        r#"
        SELECT
            COUNT(DISTINCT c.channel_name) AS total_channels,
            COUNT(m.message_id) AS total_messages,
            COUNT(CASE WHEN m.has_media THEN 1 END) AS messages_with_media,
            COUNT(DISTINCT d.detection_id) AS total_detections
        FROM marts.fct_messages m
        JOIN marts.dim_channels c ON m.channel_id = c.channel_id
        LEFT JOIN marts.fct_image_detections d ON m.message_id = d.message_id
        "#,
    )
    .fetch_one(&state.db)
    .await?;

    Ok(Json(stats))
}
