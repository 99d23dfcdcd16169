//! Raw warehouse schema
//!
//! Create-if-absent DDL for the `raw` schema. Every statement is idempotent
//! and runs before any insert, so a replayed or interrupted run can always
//! bring the schema up first.
//!
//! Invariants carried by the schema itself:
//! - `telegram_messages` is unique on `(channel_name, message_id)`; repeated
//!   ingestion of the same pair is a conflict, resolved to a no-op.
//! - `media_artifacts` maps each artifact path to its owning message
//!   explicitly, so enrichment does not have to parse identity out of
//!   filenames.
//! - `enrichment_state` is keyed on `image_path`; two sweeps racing on the
//!   same artifact produce an enforced conflict instead of duplicates.

use sqlx::PgPool;

const RAW_DDL: &[&str] = &[
    "CREATE SCHEMA IF NOT EXISTS raw",
    r#"
    CREATE TABLE IF NOT EXISTS raw.telegram_messages (
        id BIGSERIAL PRIMARY KEY,
        message_id BIGINT NOT NULL,
        channel_name VARCHAR(255) NOT NULL,
        message_text TEXT,
        message_date TIMESTAMPTZ,
        has_media BOOLEAN NOT NULL DEFAULT FALSE,
        media_type VARCHAR(50),
        scraped_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP,
        raw_data JSONB NOT NULL DEFAULT '{}'::jsonb,
        UNIQUE (channel_name, message_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS raw.media_artifacts (
        artifact_path TEXT PRIMARY KEY,
        channel_name VARCHAR(255) NOT NULL,
        message_id BIGINT NOT NULL,
        downloaded_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS raw.image_detections (
        id BIGSERIAL PRIMARY KEY,
        message_id BIGINT,
        image_path TEXT NOT NULL,
        detected_class VARCHAR(100) NOT NULL,
        confidence_score DOUBLE PRECISION NOT NULL,
        bbox_coordinates JSONB NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS raw.enrichment_state (
        image_path TEXT PRIMARY KEY,
        status VARCHAR(20) NOT NULL,
        message_id BIGINT,
        detections_found INT,
        processed_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS raw.pipeline_runs (
        id BIGSERIAL PRIMARY KEY,
        run_id UUID NOT NULL,
        node VARCHAR(20) NOT NULL,
        status VARCHAR(20) NOT NULL,
        started_at TIMESTAMPTZ,
        finished_at TIMESTAMPTZ,
        detail TEXT
    )
    "#,
];

/// Create the raw schema and its tables if absent
pub async fn ensure_raw_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    for statement in RAW_DDL {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
