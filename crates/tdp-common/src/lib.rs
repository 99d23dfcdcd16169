//! TDP Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the TDP project.
//!
//! # Overview
//!
//! This crate provides common functionality used across all TDP workspace members:
//!
//! - **Error Handling**: Custom error types and result types
//! - **Correlation**: Message-id extraction from media artifact paths
//! - **Logging**: Centralized tracing setup

pub mod correlation;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use correlation::{message_id_from_path, CorrelationError};
pub use error::{Result, TdpError};
