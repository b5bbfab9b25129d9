//! Driftmark: anomaly-detection scoring and provenance for pipeline runs.
//!
//! The plugin hangs off an orchestrator's lifecycle hooks. Events go to
//! an append-only audit log, catalog and pipeline snapshots are
//! content-addressed, and every score batch is persisted under a fresh
//! context row that ties it to one run, algorithm and parameter set.
//!
//! Wiring is explicit: the host builds a [`ProvenanceDb`], a
//! [`GatewayRegistry`] and a [`ScorerRegistry`] once, then hands them to
//! [`RunHooks`] - there is no ambient global state.

pub mod gateway;
pub mod hooks;
pub mod scoring;

pub use driftmark_db::{EventKind, ProvenanceDb, ViewRegistry};
pub use driftmark_logging::{init_logging, LogConfig};
pub use driftmark_protocol::{
    NodeInfo, PipelineSpec, RunId, RunParams, SinkConfig, StoreConfig, WriteStrategy,
};
pub use driftmark_sinks::ScoreSink;

pub use gateway::{GatewayRegistry, LoggingGateway, NodeData, NodeGateway, NumericInputValidator};
pub use hooks::RunHooks;
pub use scoring::{score_node, MadScorer, Scorer, ScorerEntry, ScorerRegistry, ZScoreScorer};
