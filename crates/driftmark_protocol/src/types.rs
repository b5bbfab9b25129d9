//! Minimal mirrors of the orchestrator's hook payloads.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A pipeline node as seen by the lifecycle hooks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfo {
    pub name: String,
    /// Tags drive gateway (validator) dispatch.
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl NodeInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tags: BTreeSet::new(),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }
}

/// Parameters the orchestrator passes to the pipeline-run hooks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunParams {
    pub pipeline_name: Option<String>,
    #[serde(default)]
    pub extra: serde_json::Value,
}

impl RunParams {
    /// Display name used for the pipelines table; unnamed runs fall back
    /// to the framework's default pipeline name.
    pub fn pipeline_name_or_default(&self) -> &str {
        self.pipeline_name.as_deref().unwrap_or("__default__")
    }
}

/// A pipeline definition as handed to the run hooks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSpec {
    pub name: String,
    /// Serialized structure of the pipeline (nodes, edges, layers).
    pub content: serde_json::Value,
}

impl PipelineSpec {
    pub fn new(name: impl Into<String>, content: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            content,
        }
    }
}
