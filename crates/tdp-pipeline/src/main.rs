//! TDP Pipeline - ingestion and enrichment tool

use anyhow::Result;
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tdp_common::logging::{init_logging, LogConfig, LogLevel};
use tdp_pipeline::enrich::EnrichError;
use tdp_pipeline::{
    Collector, DbtRunner, Enricher, HttpDetector, PipelineConfig, PipelineOrchestrator,
    TelegramSource, WarehouseLoader,
};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "tdp-pipeline")]
#[command(author, version, about = "Telegram data pipeline runner")]
struct Cli {
    /// Pipeline node to run
    #[command(subcommand)]
    node: NodeCommand,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Parser, Debug)]
enum NodeCommand {
    /// Collect messages and media into staging batches
    Scrape {
        /// Collect a single channel instead of the configured list
        #[arg(short, long)]
        channel: Option<String>,

        /// Per-channel message limit
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Load staged batches into raw storage
    Load,

    /// Run the external dbt transformations
    Transform,

    /// Enrich media artifacts with object detections
    Enrich,

    /// Run the full scrape -> load -> transform -> enrich chain once
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbose flag
    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let mut log_config = LogConfig::from_env().unwrap_or_default();
    log_config.level = log_level;
    log_config.file_prefix = "tdp-pipeline".to_string();

    init_logging(&log_config)?;

    let config = PipelineConfig::load()?;

    match cli.node {
        NodeCommand::Scrape { channel, limit } => {
            let channels = match channel {
                Some(single) => vec![single],
                None => config.channels.clone(),
            };
            if channels.is_empty() {
                anyhow::bail!("No channels to collect (set TDP_CHANNELS or pass --channel)");
            }

            let collector = Collector::new(
                TelegramSource::new(&config.telegram),
                config.staging_root.clone(),
                config.media_root.clone(),
                config.collect_concurrency,
            );
            let limit = limit.unwrap_or(config.message_limit);
            let report = collector.collect_all(&channels, limit).await;
            if report.channels_succeeded == 0 && report.channels_failed > 0 {
                anyhow::bail!("all {} channels failed", report.channels_failed);
            }
        },

        NodeCommand::Load => {
            let db = connect(&config).await?;
            let loader = WarehouseLoader::new(db, config.staging_root.clone());
            let report = loader.load_all().await?;
            info!(
                inserted = report.rows_inserted,
                skipped = report.rows_skipped,
                "Load finished"
            );
        },

        NodeCommand::Transform => {
            DbtRunner::new(config.dbt.clone()).transform().await?;
        },

        NodeCommand::Enrich => {
            let db = connect(&config).await?;
            let detector = HttpDetector::new(&config.detector)?;
            let enricher = Enricher::new(db, config.media_root.clone(), detector);
            match enricher.sweep().await {
                Ok(report) => info!(
                    enriched = report.enriched,
                    detections = report.detections,
                    "Enrichment finished"
                ),
                Err(EnrichError::SweepInProgress) => {
                    warn!("Enrichment sweep already in progress");
                },
                Err(e) => return Err(e.into()),
            }
        },

        NodeCommand::Run => {
            let db = connect(&config).await?;
            let orchestrator = PipelineOrchestrator::from_config(config, db)?;
            let report = orchestrator.run_once().await;
            if !report.succeeded() {
                anyhow::bail!("pipeline run {} finished with failures", report.run_id);
            }
        },
    }

    info!("Done");
    Ok(())
}

/// Connect the warehouse pool
async fn connect(config: &PipelineConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    Ok(pool)
}
