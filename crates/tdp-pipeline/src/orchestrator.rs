//! Pipeline orchestrator
//!
//! Sequences the four pipeline nodes as a linear dependency chain:
//! `scrape -> load -> transform -> enrich`. Each node moves through
//! `Pending -> Running -> Succeeded | Failed`; a failure propagates by
//! marking every downstream node `Skipped` for that run. Because every node
//! is independently idempotent, a failed run never corrupts the next
//! scheduled run; the recovery path is simply the next trigger.
//!
//! Node reports are persisted to `raw.pipeline_runs` for inspection;
//! bookkeeping failures are logged, never fatal.

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::collector::Collector;
use crate::config::PipelineConfig;
use crate::enrich::{EnrichError, Enricher, HttpDetector, ObjectDetector};
use crate::loader::WarehouseLoader;
use crate::source::{MessageSource, TelegramSource};
use crate::transform::DbtRunner;

/// A pipeline node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    Scrape,
    Load,
    Transform,
    Enrich,
}

impl Node {
    /// Name persisted to run bookkeeping
    pub fn as_str(self) -> &'static str {
        match self {
            Node::Scrape => "scrape",
            Node::Load => "load",
            Node::Transform => "transform",
            Node::Enrich => "enrich",
        }
    }
}

/// Node execution state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl NodeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeStatus::Pending => "pending",
            NodeStatus::Running => "running",
            NodeStatus::Succeeded => "succeeded",
            NodeStatus::Failed => "failed",
            NodeStatus::Skipped => "skipped",
        }
    }
}

/// Outcome of one node in a run
#[derive(Debug, Clone)]
pub struct NodeReport {
    pub node: Node,
    pub status: NodeStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub detail: Option<String>,
}

/// Outcome of one pipeline run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub nodes: Vec<NodeReport>,
}

impl RunReport {
    /// Whether every node succeeded
    pub fn succeeded(&self) -> bool {
        self.nodes
            .iter()
            .all(|n| n.status == NodeStatus::Succeeded)
    }

    /// Report for a specific node
    pub fn node(&self, node: Node) -> Option<&NodeReport> {
        self.nodes.iter().find(|n| n.node == node)
    }
}

type NodeFuture<'a> = BoxFuture<'a, anyhow::Result<String>>;

/// Execute an ordered chain of nodes with failure propagation: the first
/// failure marks every remaining node `Skipped`.
async fn run_chain(run_id: Uuid, nodes: Vec<(Node, NodeFuture<'_>)>) -> RunReport {
    let mut reports = Vec::with_capacity(nodes.len());
    let mut chain_failed = false;

    for (node, work) in nodes {
        if chain_failed {
            reports.push(NodeReport {
                node,
                status: NodeStatus::Skipped,
                started_at: None,
                finished_at: None,
                detail: None,
            });
            continue;
        }

        let started_at = Utc::now();
        info!(run_id = %run_id, node = node.as_str(), "Node started");

        let (status, detail) = match work.await {
            Ok(detail) => {
                info!(run_id = %run_id, node = node.as_str(), detail = %detail, "Node succeeded");
                (NodeStatus::Succeeded, Some(detail))
            },
            Err(e) => {
                error!(run_id = %run_id, node = node.as_str(), error = %e, "Node failed");
                chain_failed = true;
                (NodeStatus::Failed, Some(e.to_string()))
            },
        };

        reports.push(NodeReport {
            node,
            status,
            started_at: Some(started_at),
            finished_at: Some(Utc::now()),
            detail,
        });
    }

    RunReport {
        run_id,
        nodes: reports,
    }
}

/// Sequences the pipeline nodes and exposes the schedulable entry point
pub struct PipelineOrchestrator<S, D> {
    config: PipelineConfig,
    db: PgPool,
    collector: Collector<S>,
    loader: WarehouseLoader,
    dbt: DbtRunner,
    enricher: Enricher<D>,
}

impl PipelineOrchestrator<TelegramSource, HttpDetector> {
    /// Build the production orchestrator from configuration
    pub fn from_config(config: PipelineConfig, db: PgPool) -> anyhow::Result<Self> {
        let source = TelegramSource::new(&config.telegram);
        let collector = Collector::new(
            source,
            config.staging_root.clone(),
            config.media_root.clone(),
            config.collect_concurrency,
        );
        let loader = WarehouseLoader::new(db.clone(), config.staging_root.clone());
        let dbt = DbtRunner::new(config.dbt.clone());
        let detector = HttpDetector::new(&config.detector)?;
        let enricher = Enricher::new(db.clone(), config.media_root.clone(), detector);

        Ok(Self {
            config,
            db,
            collector,
            loader,
            dbt,
            enricher,
        })
    }
}

impl<S, D> PipelineOrchestrator<S, D>
where
    S: MessageSource + 'static,
    D: ObjectDetector + 'static,
{
    /// Create an orchestrator from explicit components
    pub fn new(
        config: PipelineConfig,
        db: PgPool,
        collector: Collector<S>,
        loader: WarehouseLoader,
        dbt: DbtRunner,
        enricher: Enricher<D>,
    ) -> Self {
        Self {
            config,
            db,
            collector,
            loader,
            dbt,
            enricher,
        }
    }

    /// Run the four-node chain once. This is the schedulable entry point.
    pub async fn run_once(&self) -> RunReport {
        let run_id = Uuid::new_v4();
        info!(run_id = %run_id, "Starting pipeline run");

        let nodes: Vec<(Node, NodeFuture<'_>)> = vec![
            (
                Node::Scrape,
                Box::pin(async {
                    let report = self
                        .collector
                        .collect_all(&self.config.channels, self.config.message_limit)
                        .await;
                    if report.channels_succeeded == 0 && report.channels_failed > 0 {
                        anyhow::bail!("all {} channels failed", report.channels_failed);
                    }
                    Ok(format!(
                        "{} messages staged, {} media downloaded",
                        report.messages_staged, report.media_downloaded
                    ))
                }),
            ),
            (
                Node::Load,
                Box::pin(async {
                    let report = self.loader.load_all().await?;
                    Ok(format!(
                        "{} rows inserted, {} skipped, {} files failed",
                        report.rows_inserted, report.rows_skipped, report.files_failed
                    ))
                }),
            ),
            (
                Node::Transform,
                Box::pin(async {
                    self.dbt.transform().await?;
                    Ok("dbt transformations completed".to_string())
                }),
            ),
            (
                Node::Enrich,
                Box::pin(async {
                    match self.enricher.sweep().await {
                        Ok(report) => Ok(format!(
                            "{} artifacts enriched, {} detections, {} skipped",
                            report.enriched, report.detections, report.skipped
                        )),
                        // An overlapping sweep is a benign no-op for this run.
                        Err(EnrichError::SweepInProgress) => {
                            warn!("Enrichment sweep already in progress");
                            Ok("sweep already in progress".to_string())
                        },
                        Err(e) => Err(e.into()),
                    }
                }),
            ),
        ];

        let report = run_chain(run_id, nodes).await;

        if let Err(e) = self.persist_report(&report).await {
            warn!(run_id = %run_id, error = %e, "Failed to persist run report");
        }

        info!(
            run_id = %run_id,
            succeeded = report.succeeded(),
            "Pipeline run completed"
        );

        report
    }

    /// Start the scheduled loop in the background
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!("Pipeline orchestrator started");

            // Initial delay to let the host process settle
            sleep(Duration::from_secs(5)).await;

            loop {
                let report = self.run_once().await;
                if !report.succeeded() {
                    error!(run_id = %report.run_id, "Pipeline run finished with failures");
                }
                sleep(Duration::from_secs(self.config.run_interval_secs)).await;
            }
        })
    }

    /// Record per-node outcomes in `raw.pipeline_runs`
    async fn persist_report(&self, report: &RunReport) -> Result<(), sqlx::Error> {
        crate::warehouse::ensure_raw_schema(&self.db).await?;

        for node in &report.nodes {
            sqlx::query(
                r#"
                INSERT INTO raw.pipeline_runs (run_id, node, status, started_at, finished_at, detail)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(report.run_id)
            .bind(node.node.as_str())
            .bind(node.status.as_str())
            .bind(node.started_at)
            .bind(node.finished_at)
            .bind(&node.detail)
            .execute(&self.db)
            .await?;
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn chain(outcomes: Vec<(Node, anyhow::Result<String>)>) -> Vec<(Node, NodeFuture<'static>)> {
        outcomes
            .into_iter()
            .map(|(node, outcome)| {
                let fut: NodeFuture<'static> = Box::pin(async move { outcome });
                (node, fut)
            })
            .collect()
    }

    #[tokio::test]
    async fn test_all_nodes_succeed() {
        let report = run_chain(
            Uuid::new_v4(),
            chain(vec![
                (Node::Scrape, Ok("staged".to_string())),
                (Node::Load, Ok("loaded".to_string())),
                (Node::Transform, Ok("transformed".to_string())),
                (Node::Enrich, Ok("enriched".to_string())),
            ]),
        )
        .await;

        assert!(report.succeeded());
        assert_eq!(report.nodes.len(), 4);
        assert!(report
            .nodes
            .iter()
            .all(|n| n.status == NodeStatus::Succeeded));
    }

    #[tokio::test]
    async fn test_transform_failure_skips_enrich_only() {
        let report = run_chain(
            Uuid::new_v4(),
            chain(vec![
                (Node::Scrape, Ok("staged".to_string())),
                (Node::Load, Ok("loaded".to_string())),
                (Node::Transform, Err(anyhow::anyhow!("dbt debug failed"))),
                (Node::Enrich, Ok("never runs".to_string())),
            ]),
        )
        .await;

        assert!(!report.succeeded());
        // Prior successes are unaffected by the downstream failure.
        assert_eq!(report.node(Node::Scrape).unwrap().status, NodeStatus::Succeeded);
        assert_eq!(report.node(Node::Load).unwrap().status, NodeStatus::Succeeded);
        assert_eq!(report.node(Node::Transform).unwrap().status, NodeStatus::Failed);
        assert_eq!(report.node(Node::Enrich).unwrap().status, NodeStatus::Skipped);
        assert!(report.node(Node::Enrich).unwrap().started_at.is_none());
    }

    #[tokio::test]
    async fn test_first_node_failure_skips_everything_downstream() {
        let report = run_chain(
            Uuid::new_v4(),
            chain(vec![
                (Node::Scrape, Err(anyhow::anyhow!("source unreachable"))),
                (Node::Load, Ok("never".to_string())),
                (Node::Transform, Ok("never".to_string())),
                (Node::Enrich, Ok("never".to_string())),
            ]),
        )
        .await;

        assert_eq!(report.node(Node::Scrape).unwrap().status, NodeStatus::Failed);
        for node in [Node::Load, Node::Transform, Node::Enrich] {
            assert_eq!(report.node(node).unwrap().status, NodeStatus::Skipped);
        }
    }

    #[tokio::test]
    async fn test_failure_detail_is_recorded() {
        let report = run_chain(
            Uuid::new_v4(),
            chain(vec![(
                Node::Transform,
                Err(anyhow::anyhow!("dbt run failed: exit 2")),
            )]),
        )
        .await;

        let node = report.node(Node::Transform).unwrap();
        assert_eq!(node.detail.as_deref(), Some("dbt run failed: exit 2"));
        assert!(node.started_at.is_some());
        assert!(node.finished_at.is_some());
    }
}
