//! Pipeline configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ============================================================================
// Pipeline Configuration Constants
// ============================================================================

/// Default per-channel message limit per collection run.
pub const DEFAULT_MESSAGE_LIMIT: usize = 100;

/// Default number of channels collected concurrently.
pub const DEFAULT_COLLECT_CONCURRENCY: usize = 4;

/// Default staging batch root directory.
pub const DEFAULT_STAGING_ROOT: &str = "data/raw/telegram_messages";

/// Default media artifact root directory.
pub const DEFAULT_MEDIA_ROOT: &str = "data/raw/media";

/// Default Telegram Bot API base URL.
pub const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Default object-detection service endpoint.
pub const DEFAULT_DETECTOR_ENDPOINT: &str = "http://127.0.0.1:8501/detect";

/// Default detection request timeout in seconds.
pub const DEFAULT_DETECTOR_TIMEOUT_SECS: u64 = 30;

/// Default dbt project directory.
pub const DEFAULT_DBT_PROJECT_DIR: &str = "dbt_project";

/// Default dbt executable.
pub const DEFAULT_DBT_BIN: &str = "dbt";

/// Default timeout for `dbt debug` in seconds.
pub const DEFAULT_DBT_DEBUG_TIMEOUT_SECS: u64 = 60;

/// Default timeout for `dbt run` in seconds.
pub const DEFAULT_DBT_RUN_TIMEOUT_SECS: u64 = 300;

/// Default timeout for `dbt test` in seconds.
pub const DEFAULT_DBT_TEST_TIMEOUT_SECS: u64 = 120;

/// Default interval between scheduled pipeline runs in seconds (daily).
pub const DEFAULT_RUN_INTERVAL_SECS: u64 = 86_400;

/// Default warehouse URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/tdp";

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Whether the scheduled orchestrator loop is enabled
    pub enabled: bool,
    /// Logical channels to collect from
    pub channels: Vec<String>,
    /// Per-channel message limit per run
    pub message_limit: usize,
    /// Bounded concurrency for channel collection
    pub collect_concurrency: usize,
    /// Root directory for staging batches
    pub staging_root: PathBuf,
    /// Root directory for downloaded media artifacts
    pub media_root: PathBuf,
    /// Seconds between scheduled runs
    pub run_interval_secs: u64,
    /// Warehouse connection URL
    pub database_url: String,
    pub telegram: TelegramConfig,
    pub detector: DetectorConfig,
    pub dbt: DbtConfig,
}

/// Messaging source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot API base URL
    pub api_base: String,
    /// Bot token used to authenticate the session
    pub bot_token: String,
}

/// Object-detection service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Inference endpoint accepting an image upload
    pub endpoint: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

/// External transformation stage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbtConfig {
    /// dbt project directory
    pub project_dir: PathBuf,
    /// dbt executable
    pub bin: String,
    pub debug_timeout_secs: u64,
    pub run_timeout_secs: u64,
    pub test_timeout_secs: u64,
}

impl PipelineConfig {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = PipelineConfig {
            enabled: std::env::var("PIPELINE_ENABLED")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(false),
            channels: std::env::var("TDP_CHANNELS")
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            message_limit: std::env::var("TDP_MESSAGE_LIMIT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MESSAGE_LIMIT),
            collect_concurrency: std::env::var("TDP_COLLECT_CONCURRENCY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_COLLECT_CONCURRENCY),
            staging_root: std::env::var("TDP_STAGING_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_STAGING_ROOT)),
            media_root: std::env::var("TDP_MEDIA_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_MEDIA_ROOT)),
            run_interval_secs: std::env::var("TDP_RUN_INTERVAL")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_RUN_INTERVAL_SECS),
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
            telegram: TelegramConfig {
                api_base: std::env::var("TELEGRAM_API_BASE")
                    .unwrap_or_else(|_| DEFAULT_TELEGRAM_API_BASE.to_string()),
                bot_token: std::env::var("TELEGRAM_BOT_TOKEN").unwrap_or_default(),
            },
            detector: DetectorConfig {
                endpoint: std::env::var("TDP_DETECTOR_URL")
                    .unwrap_or_else(|_| DEFAULT_DETECTOR_ENDPOINT.to_string()),
                timeout_secs: std::env::var("TDP_DETECTOR_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DETECTOR_TIMEOUT_SECS),
            },
            dbt: DbtConfig {
                project_dir: std::env::var("TDP_DBT_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from(DEFAULT_DBT_PROJECT_DIR)),
                bin: std::env::var("TDP_DBT_BIN").unwrap_or_else(|_| DEFAULT_DBT_BIN.to_string()),
                debug_timeout_secs: std::env::var("TDP_DBT_DEBUG_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DBT_DEBUG_TIMEOUT_SECS),
                run_timeout_secs: std::env::var("TDP_DBT_RUN_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DBT_RUN_TIMEOUT_SECS),
                test_timeout_secs: std::env::var("TDP_DBT_TEST_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DBT_TEST_TIMEOUT_SECS),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.message_limit == 0 {
            anyhow::bail!("Message limit must be greater than 0");
        }

        if self.collect_concurrency == 0 {
            anyhow::bail!("Collect concurrency must be greater than 0");
        }

        if self.enabled && self.channels.is_empty() {
            anyhow::bail!("Pipeline is enabled but no channels are configured (TDP_CHANNELS)");
        }

        if self.dbt.bin.is_empty() {
            anyhow::bail!("dbt executable cannot be empty");
        }

        if self.database_url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            channels: Vec::new(),
            message_limit: DEFAULT_MESSAGE_LIMIT,
            collect_concurrency: DEFAULT_COLLECT_CONCURRENCY,
            staging_root: PathBuf::from(DEFAULT_STAGING_ROOT),
            media_root: PathBuf::from(DEFAULT_MEDIA_ROOT),
            run_interval_secs: DEFAULT_RUN_INTERVAL_SECS,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            telegram: TelegramConfig {
                api_base: DEFAULT_TELEGRAM_API_BASE.to_string(),
                bot_token: String::new(),
            },
            detector: DetectorConfig {
                endpoint: DEFAULT_DETECTOR_ENDPOINT.to_string(),
                timeout_secs: DEFAULT_DETECTOR_TIMEOUT_SECS,
            },
            dbt: DbtConfig {
                project_dir: PathBuf::from(DEFAULT_DBT_PROJECT_DIR),
                bin: DEFAULT_DBT_BIN.to_string(),
                debug_timeout_secs: DEFAULT_DBT_DEBUG_TIMEOUT_SECS,
                run_timeout_secs: DEFAULT_DBT_RUN_TIMEOUT_SECS,
                test_timeout_secs: DEFAULT_DBT_TEST_TIMEOUT_SECS,
            },
        }
    }
}
