//! TDP Server - read-only query surface over the warehouse
//!
//! Thin parameterized read endpoints over the curated `marts` tables built
//! by the pipeline and the external transformation stage. The server can
//! also host the scheduled pipeline orchestrator when `PIPELINE_ENABLED`
//! is set.

pub mod api;
pub mod config;
pub mod error;
pub mod middleware;

pub use config::Config;
pub use error::{ApiResult, AppError};
