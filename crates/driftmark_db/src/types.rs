//! Entity types persisted by the provenance store.
//!
//! These are the single source of truth for the five Driftmark tables.
//! `samples` is external: any per-deployment table with an `id` column.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle hook that produced an event row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    AfterCatalogCreated,
    BeforeNodeRun,
    AfterNodeRun,
    OnNodeError,
    BeforePipelineRun,
    AfterPipelineRun,
    OnPipelineError,
    BeforeDatasetLoaded,
    AfterDatasetLoaded,
    BeforeDatasetSaved,
    AfterDatasetSaved,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AfterCatalogCreated => "after_catalog_created",
            Self::BeforeNodeRun => "before_node_run",
            Self::AfterNodeRun => "after_node_run",
            Self::OnNodeError => "on_node_error",
            Self::BeforePipelineRun => "before_pipeline_run",
            Self::AfterPipelineRun => "after_pipeline_run",
            Self::OnPipelineError => "on_pipeline_error",
            Self::BeforeDatasetLoaded => "before_dataset_loaded",
            Self::AfterDatasetLoaded => "after_dataset_loaded",
            Self::BeforeDatasetSaved => "before_dataset_saved",
            Self::AfterDatasetSaved => "after_dataset_saved",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "after_catalog_created" => Some(Self::AfterCatalogCreated),
            "before_node_run" => Some(Self::BeforeNodeRun),
            "after_node_run" => Some(Self::AfterNodeRun),
            "on_node_error" => Some(Self::OnNodeError),
            "before_pipeline_run" => Some(Self::BeforePipelineRun),
            "after_pipeline_run" => Some(Self::AfterPipelineRun),
            "on_pipeline_error" => Some(Self::OnPipelineError),
            "before_dataset_loaded" => Some(Self::BeforeDatasetLoaded),
            "after_dataset_loaded" => Some(Self::AfterDatasetLoaded),
            "before_dataset_saved" => Some(Self::BeforeDatasetSaved),
            "after_dataset_saved" => Some(Self::AfterDatasetSaved),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One row of the append-only lifecycle audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub run_id: String,
    pub event_type: EventKind,
    /// Short hash of the hook target (node name, pipeline repr, ...).
    pub target_id: String,
    pub target_name: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Content-addressed snapshot of a loaded catalog configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    pub hash: String,
    pub content: String,
}

/// Content-addressed snapshot of a pipeline definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRecord {
    pub hash: String,
    pub name: String,
    pub content: String,
}

/// Scope row for one batch of anomaly scores.
///
/// Always inserted fresh: repeated runs of the same algorithm and
/// parameters produce distinct surrogate ids, so prior score rows are
/// never destructively updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Context {
    pub id: i64,
    pub run_id: String,
    pub algorithm: String,
    /// Serialized parameter set; compared by exact string equality.
    pub parameters: String,
}

/// One anomaly score, keyed by `(context_id, sample_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlierScoreRow {
    pub context_id: i64,
    pub sample_id: i64,
    pub score: f64,
    pub prediction: bool,
}
