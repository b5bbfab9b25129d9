//! Shared types for the Driftmark provenance plugin.
//!
//! Everything that crosses a crate boundary lives here: run identifiers,
//! store/sink configuration, and the minimal mirrors of the orchestrator's
//! hook payloads. The orchestration framework itself is an external
//! collaborator; Driftmark only sees these types.

pub mod config;
pub mod ids;
pub mod types;

pub use config::{FallbackPolicy, SinkConfig, StoreConfig, WriteStrategy};
pub use ids::RunId;
pub use types::{NodeInfo, PipelineSpec, RunParams};
