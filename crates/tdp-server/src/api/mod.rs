//! Read API surface
//!
//! Read-only projections over the curated `marts` tables. Handlers are thin:
//! one parameterized query each, mapped straight into response types.

pub mod reports;
pub mod types;

use axum::{routing::get, Router};
use sqlx::PgPool;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
}

/// Build the API router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(reports::health_check))
        .route("/api/reports/top-products", get(reports::top_products))
        .route(
            "/api/channels/:channel_name/activity",
            get(reports::channel_activity),
        )
        .route("/api/search/messages", get(reports::search_messages))
        .route("/api/stats/overview", get(reports::overview_stats))
        .with_state(state)
}
