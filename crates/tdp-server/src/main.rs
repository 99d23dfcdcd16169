//! TDP Server - Main entry point

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tdp_common::logging::{init_logging, LogConfig};
use tdp_pipeline::{PipelineConfig, PipelineOrchestrator};
use tdp_server::api::{self, AppState};
use tdp_server::{middleware, Config};
use tokio::signal;
use tower_http::compression::CompressionLayer;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging with configuration from environment
    let mut log_config = LogConfig::from_env().unwrap_or_default();
    log_config.file_prefix = "tdp-server".to_string();
    if log_config.filter_directives.is_none() {
        log_config.filter_directives =
            Some("tdp_server=debug,tower_http=debug,sqlx=info".to_string());
    }

    init_logging(&log_config)?;

    info!("Starting TDP Server");

    // Load configuration
    let config = Config::load()?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        config.server.host, config.server.port
    );

    // Initialize database connection pool
    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .acquire_timeout(Duration::from_secs(config.database.connect_timeout_secs))
        .connect(&config.database.url)
        .await?;

    info!("Database connection pool established");

    // Start the scheduled pipeline orchestrator if enabled
    let _orchestrator_handle = match PipelineConfig::load() {
        Ok(pipeline_config) if pipeline_config.enabled => {
            info!("Pipeline is enabled, starting orchestrator");
            let orchestrator =
                Arc::new(PipelineOrchestrator::from_config(pipeline_config, db_pool.clone())?);
            Some(orchestrator.start())
        },
        Ok(_) => {
            info!("Pipeline is disabled (PIPELINE_ENABLED=false)");
            None
        },
        Err(e) => {
            info!("Pipeline configuration invalid, orchestrator not started: {}", e);
            None
        },
    };

    // Build the application router
    let state = AppState { db: db_pool };
    let app = api::router(state)
        .layer(CompressionLayer::new())
        .layer(middleware::tracing_layer())
        .layer(middleware::cors_layer(&config.cors));

    // Create socket address
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Start server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(config.server.shutdown_timeout_secs))
        .await?;

    info!("Server shut down gracefully");

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal(timeout_secs: u64) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }

    // Give ongoing requests time to complete
    info!("Waiting up to {} seconds for connections to close", timeout_secs);
    tokio::time::sleep(Duration::from_secs(timeout_secs.min(5))).await;
}
