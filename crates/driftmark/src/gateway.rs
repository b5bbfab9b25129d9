//! Gateways validate the data entering and leaving tagged nodes.
//!
//! The registry is populated at configuration time and passed into the
//! hook dispatcher; a gateway fires for every node whose tags intersect
//! the tags it was registered under, in registration order. Validation
//! failures propagate to the caller so the framework's node-error path
//! can handle them - they never kill the process.

use anyhow::{anyhow, bail, Result};
use arrow::array::RecordBatch;
use driftmark_protocol::NodeInfo;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::info;

/// One named value flowing into or out of a node.
#[derive(Debug, Clone)]
pub enum NodeValue {
    /// A dataframe.
    Batch(RecordBatch),
    /// A parameter structure.
    Params(serde_json::Value),
}

/// The inputs or outputs of a node, keyed by dataset/parameter name.
pub type NodeData = BTreeMap<String, NodeValue>;

/// Input/output validation hooks for tagged nodes.
///
/// Both methods default to no-ops; implementations override whichever
/// direction they care about.
pub trait NodeGateway: Send + Sync {
    fn name(&self) -> &'static str;

    fn validate_input(&self, _node: &NodeInfo, _inputs: &NodeData) -> Result<()> {
        Ok(())
    }

    fn validate_output(&self, _node: &NodeInfo, _outputs: &NodeData) -> Result<()> {
        Ok(())
    }
}

/// Tag-keyed gateway registry.
#[derive(Default, Clone)]
pub struct GatewayRegistry {
    next_seq: u64,
    by_tag: HashMap<String, Vec<(u64, Arc<dyn NodeGateway>)>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a gateway to one tag. Each registration is an
    /// independent subscription: the same instance registered under two
    /// tags fires once per tag a node matches.
    pub fn register(&mut self, tag: impl Into<String>, gateway: Arc<dyn NodeGateway>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.by_tag.entry(tag.into()).or_default().push((seq, gateway));
    }

    fn matching(&self, node: &NodeInfo) -> Vec<Arc<dyn NodeGateway>> {
        let mut hits: Vec<(u64, Arc<dyn NodeGateway>)> = Vec::new();
        for tag in &node.tags {
            if let Some(entries) = self.by_tag.get(tag) {
                hits.extend(entries.iter().cloned());
            }
        }
        hits.sort_by_key(|(seq, _)| *seq);
        hits.into_iter().map(|(_, gateway)| gateway).collect()
    }

    pub fn validate_inputs(&self, node: &NodeInfo, inputs: &NodeData) -> Result<()> {
        for gateway in self.matching(node) {
            gateway.validate_input(node, inputs)?;
        }
        Ok(())
    }

    pub fn validate_outputs(&self, node: &NodeInfo, outputs: &NodeData) -> Result<()> {
        for gateway in self.matching(node) {
            gateway.validate_output(node, outputs)?;
        }
        Ok(())
    }
}

/// Gateway that does nothing but log, useful as a wiring smoke test.
pub struct LoggingGateway;

impl NodeGateway for LoggingGateway {
    fn name(&self) -> &'static str {
        "logging"
    }

    fn validate_input(&self, node: &NodeInfo, _inputs: &NodeData) -> Result<()> {
        info!(node = %node.name, "input validated");
        Ok(())
    }

    fn validate_output(&self, node: &NodeInfo, _outputs: &NodeData) -> Result<()> {
        info!(node = %node.name, "output validated");
        Ok(())
    }
}

/// Checks that every configured feature column of the node's input
/// dataframe has a numeric type.
///
/// The dataframe is the first `Batch` input; the feature list is the
/// `cols` entry of the first `Params` input that carries one. A missing
/// dataframe or feature list is an error.
pub struct NumericInputValidator;

impl NodeGateway for NumericInputValidator {
    fn name(&self) -> &'static str {
        "numeric_input"
    }

    fn validate_input(&self, node: &NodeInfo, inputs: &NodeData) -> Result<()> {
        let mut dataset: Option<(&String, &RecordBatch)> = None;
        let mut cols: Vec<String> = Vec::new();
        for (key, value) in inputs {
            match value {
                NodeValue::Batch(batch) if dataset.is_none() => dataset = Some((key, batch)),
                NodeValue::Params(params) if cols.is_empty() => {
                    if let Some(list) = params.get("cols").and_then(|v| v.as_array()) {
                        cols = list
                            .iter()
                            .filter_map(|v| v.as_str().map(str::to_string))
                            .collect();
                    }
                }
                _ => {}
            }
        }

        let (dataset_name, batch) = dataset
            .ok_or_else(|| anyhow!("node {}: no input dataset to validate", node.name))?;
        if cols.is_empty() {
            bail!("node {}: no feature columns configured", node.name);
        }

        let schema = batch.schema();
        for col in &cols {
            let field = schema
                .field_with_name(col)
                .map_err(|_| anyhow!("node {}: column {} missing in {}", node.name, col, dataset_name))?;
            if !field.data_type().is_numeric() {
                bail!(
                    "node {}: column {} in {} is not numeric ({})",
                    node.name,
                    col,
                    dataset_name,
                    field.data_type()
                );
            }
        }
        info!(node = %node.name, dataset = %dataset_name, ?cols, "feature columns are numeric");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Float64Array, Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn weather_batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("temp", DataType::Float64, false),
            Field::new("station", DataType::Utf8, false),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1, 2])),
                Arc::new(Float64Array::from(vec![21.5, 19.0])),
                Arc::new(StringArray::from(vec!["a", "b"])),
            ],
        )
        .unwrap()
    }

    fn inputs(params: serde_json::Value) -> NodeData {
        let mut data = NodeData::new();
        data.insert("weather".into(), NodeValue::Batch(weather_batch()));
        data.insert("params:ad".into(), NodeValue::Params(params));
        data
    }

    #[test]
    fn numeric_validator_accepts_numeric_features() {
        let node = NodeInfo::new("score").with_tag("ad");
        let validator = NumericInputValidator;
        validator
            .validate_input(&node, &inputs(json!({"cols": ["temp"]})))
            .unwrap();
    }

    #[test]
    fn numeric_validator_rejects_text_features() {
        let node = NodeInfo::new("score").with_tag("ad");
        let validator = NumericInputValidator;
        assert!(validator
            .validate_input(&node, &inputs(json!({"cols": ["station"]})))
            .is_err());
    }

    #[test]
    fn numeric_validator_requires_dataset_and_cols() {
        let node = NodeInfo::new("score");
        let validator = NumericInputValidator;
        assert!(validator.validate_input(&node, &NodeData::new()).is_err());
        assert!(validator
            .validate_input(&node, &inputs(json!({})))
            .is_err());
    }

    struct Counting(AtomicUsize);

    impl NodeGateway for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn validate_input(&self, _node: &NodeInfo, _inputs: &NodeData) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn dispatch_matches_tags_and_runs_once() {
        let counter = Arc::new(Counting(AtomicUsize::new(0)));
        let mut registry = GatewayRegistry::new();
        registry.register("ad", counter.clone());
        registry.register("scoring", counter.clone());

        // Both tags match, but each registration fires independently.
        let node = NodeInfo::new("score").with_tag("ad").with_tag("scoring");
        registry.validate_inputs(&node, &NodeData::new()).unwrap();
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);

        // No matching tag: nothing fires.
        let other = NodeInfo::new("clean").with_tag("prep");
        registry.validate_inputs(&other, &NodeData::new()).unwrap();
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
    }
}
