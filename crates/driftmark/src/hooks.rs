//! Lifecycle hooks: the plugin's inbound surface.
//!
//! The orchestrator calls these around catalog loading, node execution,
//! pipeline runs and dataset IO. Every hook appends an audit event;
//! the pipeline hooks additionally persist content-addressed snapshots,
//! and a successful run ends with schema and view emission. Audit
//! failures are swallowed inside the store layer - no hook aborts the
//! pipeline over a failed provenance write.

use crate::gateway::{GatewayRegistry, NodeData};
use anyhow::Result;
use driftmark_db::{EventKind, ProvenanceDb, ViewRegistry};
use driftmark_protocol::{NodeInfo, PipelineSpec, RunId, RunParams};
use tracing::info;

/// Hook set for one pipeline run.
///
/// Construction mints the run id that scopes every event, context and
/// view this run produces.
pub struct RunHooks {
    run_id: RunId,
    db: ProvenanceDb,
    views: ViewRegistry,
    gateways: GatewayRegistry,
}

impl RunHooks {
    pub fn new(db: ProvenanceDb, views: ViewRegistry, gateways: GatewayRegistry) -> Self {
        Self {
            run_id: RunId::new(),
            db,
            views,
            gateways,
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn views(&self) -> &ViewRegistry {
        &self.views
    }

    /// Catalog loaded: audit the event and snapshot the configuration.
    pub async fn after_catalog_created(&self, conf_catalog: &serde_json::Value) {
        let target = conf_catalog.to_string();
        info!("catalog loaded");

        self.db
            .record_event(&self.run_id, EventKind::AfterCatalogCreated, &target, None)
            .await;
        self.db.upsert_catalog(conf_catalog).await;
    }

    /// Node about to run: gateway input validation, then the audit row.
    /// A validation failure propagates into the framework's node-error
    /// handling.
    pub async fn before_node_run(&self, node: &NodeInfo, inputs: &NodeData) -> Result<()> {
        self.gateways.validate_inputs(node, inputs)?;
        info!(node = %node.name, "running node");

        self.db
            .record_event(&self.run_id, EventKind::BeforeNodeRun, &node.name, None)
            .await;
        Ok(())
    }

    /// Node finished: gateway output validation, then the audit row.
    pub async fn after_node_run(&self, node: &NodeInfo, outputs: &NodeData) -> Result<()> {
        self.gateways.validate_outputs(node, outputs)?;
        info!(node = %node.name, "node ran successfully");

        self.db
            .record_event(&self.run_id, EventKind::AfterNodeRun, &node.name, None)
            .await;
        Ok(())
    }

    pub async fn on_node_error(&self, node: &NodeInfo) {
        info!(node = %node.name, "node failed");
        self.db
            .record_event(&self.run_id, EventKind::OnNodeError, &node.name, None)
            .await;
    }

    /// Pipeline starting: audit the event and snapshot the definition.
    pub async fn before_pipeline_run(&self, params: &RunParams, pipeline: &PipelineSpec) {
        let name = params.pipeline_name_or_default();
        let target = pipeline.content.to_string();
        info!(pipeline = name, "before pipeline run");

        self.db
            .record_event(&self.run_id, EventKind::BeforePipelineRun, &target, None)
            .await;
        self.db
            .upsert_pipeline(&target, name, &pipeline.content)
            .await;
    }

    /// Pipeline finished successfully: audit, then emit the schema and
    /// the views registered during this run. Emission is deliberately
    /// deferred to here so failed or partial runs never churn the
    /// schema.
    pub async fn after_pipeline_run(&self, pipeline: &PipelineSpec) -> Result<()> {
        let target = pipeline.content.to_string();
        self.db
            .record_event(&self.run_id, EventKind::AfterPipelineRun, &target, None)
            .await;

        self.db.ensure_schema().await?;
        self.db.emit_views(&self.views).await?;
        info!(pipeline = %pipeline.name, "pipeline ran successfully");
        Ok(())
    }

    pub async fn on_pipeline_error(&self, pipeline: &PipelineSpec) {
        let target = pipeline.content.to_string();
        self.db
            .record_event(&self.run_id, EventKind::OnPipelineError, &target, None)
            .await;
        info!(pipeline = %pipeline.name, "pipeline failed");
    }

    pub async fn before_dataset_loaded(&self, dataset_name: &str) {
        info!(dataset = dataset_name, "loading dataset");
        self.db
            .record_event(
                &self.run_id,
                EventKind::BeforeDatasetLoaded,
                dataset_name,
                Some(dataset_name),
            )
            .await;
    }

    pub async fn after_dataset_loaded(&self, dataset_name: &str) {
        info!(dataset = dataset_name, "dataset loaded");
        self.db
            .record_event(
                &self.run_id,
                EventKind::AfterDatasetLoaded,
                dataset_name,
                Some(dataset_name),
            )
            .await;
    }

    pub async fn before_dataset_saved(&self, dataset_name: &str) {
        info!(dataset = dataset_name, "saving dataset");
        self.db
            .record_event(
                &self.run_id,
                EventKind::BeforeDatasetSaved,
                dataset_name,
                Some(dataset_name),
            )
            .await;
    }

    pub async fn after_dataset_saved(&self, dataset_name: &str) {
        info!(dataset = dataset_name, "dataset saved");
        self.db
            .record_event(
                &self.run_id,
                EventKind::AfterDatasetSaved,
                dataset_name,
                Some(dataset_name),
            )
            .await;
    }
}
