//! TDP Pipeline - incremental Telegram ingestion and enrichment
//!
//! The pipeline moves data through four idempotent stages:
//!
//! 1. **Collector** - pulls messages and media per channel from the external
//!    messaging source into staging batches on disk
//! 2. **Loader** - merges staged batches into the `raw` warehouse schema,
//!    at most once per `(channel_name, message_id)`
//! 3. **Transform** - drives the external dbt project that materializes the
//!    curated `marts` tables
//! 4. **Enricher** - runs object detection over media artifacts and persists
//!    detection records correlated back to their owning messages
//!
//! The orchestrator sequences the stages as a linear dependency chain with
//! per-node failure isolation; every stage is safe to re-run.

pub mod collector;
pub mod config;
pub mod enrich;
pub mod loader;
pub mod orchestrator;
pub mod source;
pub mod staging;
pub mod transform;
pub mod warehouse;

pub use collector::{CollectError, Collector, CollectorReport};
pub use config::PipelineConfig;
pub use enrich::{Detection, Enricher, EnrichError, HttpDetector, ObjectDetector, SweepReport};
pub use loader::{LoadError, LoadReport, WarehouseLoader};
pub use orchestrator::{Node, NodeStatus, PipelineOrchestrator, RunReport};
pub use source::{MessageSource, SourceError, TelegramSource};
pub use transform::{DbtRunner, TransformError};
