//! Scoring dispatch: algorithm id -> (defaults, fit/score function).
//!
//! The batch writer and context resolver stay agnostic of which
//! algorithm ran; everything algorithm-specific goes through the
//! registry. Real deployments register their own scorers - the two
//! reference implementations here exist so the plugin works out of the
//! box and the tests have something deterministic to run.

use anyhow::{anyhow, Result};
use arrow::array::{Float64Array, Int64Array, RecordBatch};
use driftmark_db::ViewRegistry;
use driftmark_protocol::RunId;
use driftmark_sinks::build_score_batch;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Row-major feature matrix extracted from a sample dataframe.
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    pub cols: Vec<String>,
    /// One inner vector per sample row.
    pub rows: Vec<Vec<f64>>,
}

/// Scores and predictions for one batch, parallel to the input rows.
/// Prediction is `true` for outliers.
#[derive(Debug, Clone)]
pub struct ScoreOutput {
    pub scores: Vec<f64>,
    pub predictions: Vec<bool>,
}

/// A pluggable anomaly-detection algorithm.
pub trait Scorer: Send + Sync {
    fn fit_score(&self, features: &FeatureMatrix, params: &Value) -> Result<ScoreOutput>;
}

/// Scoring failure carrying the algorithm name, surfaced to the
/// framework's node-error handling.
#[derive(Debug, Error)]
#[error("Could not run {algorithm}: {source}")]
pub struct ScoringError {
    pub algorithm: String,
    #[source]
    pub source: anyhow::Error,
}

impl ScoringError {
    fn new(algorithm: impl Into<String>, source: anyhow::Error) -> Self {
        Self {
            algorithm: algorithm.into(),
            source,
        }
    }
}

/// Registry entry: display name, default parameter structure, scorer.
#[derive(Clone)]
pub struct ScorerEntry {
    pub display_name: String,
    pub default_params: Value,
    pub scorer: Arc<dyn Scorer>,
}

/// Dispatch table mapping algorithm identifiers to scorers.
#[derive(Default, Clone)]
pub struct ScorerRegistry {
    entries: HashMap<String, ScorerEntry>,
}

impl ScorerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the reference scorers.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(
            "zscore",
            ScorerEntry {
                display_name: "Z-Score".into(),
                default_params: serde_json::json!({"cols": [], "threshold": 3.0}),
                scorer: Arc::new(ZScoreScorer),
            },
        );
        registry.register(
            "mad",
            ScorerEntry {
                display_name: "Median Absolute Deviation".into(),
                default_params: serde_json::json!({"cols": [], "threshold": 3.5}),
                scorer: Arc::new(MadScorer),
            },
        );
        registry
    }

    pub fn register(&mut self, id: impl Into<String>, entry: ScorerEntry) {
        self.entries.insert(id.into(), entry);
    }

    pub fn get(&self, id: &str) -> Option<&ScorerEntry> {
        self.entries.get(id)
    }
}

/// Run one scoring node: register the forward-declared score view,
/// extract the feature matrix, fit/score, and return the score batch
/// ready for the sink.
///
/// The view is registered before scoring executes; its query stays
/// empty until the batch is persisted and committed.
pub fn score_node(
    data: &RecordBatch,
    params: &Value,
    run_id: &RunId,
    registry: &ScorerRegistry,
    algorithm_id: &str,
    views: &ViewRegistry,
) -> Result<RecordBatch, ScoringError> {
    let entry = registry.get(algorithm_id).ok_or_else(|| {
        ScoringError::new(algorithm_id, anyhow!("no scorer registered under this id"))
    })?;
    let display_name = entry.display_name.clone();
    let parameters_json = serde_json::to_string(params)
        .map_err(|e| ScoringError::new(&display_name, e.into()))?;

    views.register_score_view(run_id, &display_name, &parameters_json);

    let (sample_ids, features) = extract_features(data, params)
        .map_err(|e| ScoringError::new(&display_name, e))?;
    let output = entry
        .scorer
        .fit_score(&features, params)
        .map_err(|e| ScoringError::new(&display_name, e))?;
    if output.scores.len() != sample_ids.len() || output.predictions.len() != sample_ids.len() {
        return Err(ScoringError::new(
            &display_name,
            anyhow!(
                "scorer returned {} scores / {} predictions for {} samples",
                output.scores.len(),
                output.predictions.len(),
                sample_ids.len()
            ),
        ));
    }
    info!(algorithm = %display_name, rows = sample_ids.len(), "scores computed");

    build_score_batch(
        &sample_ids,
        &output.scores,
        &output.predictions,
        run_id.as_str(),
        &display_name,
        &parameters_json,
    )
    .map_err(|e| ScoringError::new(&display_name, e.into()))
}

/// Pull the `id` column and the `params.cols` feature columns out of a
/// sample dataframe. Integer feature columns are widened to f64.
fn extract_features(data: &RecordBatch, params: &Value) -> Result<(Vec<i64>, FeatureMatrix)> {
    let cols: Vec<String> = params
        .get("cols")
        .and_then(|v| v.as_array())
        .map(|list| {
            list.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    if cols.is_empty() {
        return Err(anyhow!("params.cols names no feature columns"));
    }

    let sample_ids = data
        .column_by_name("id")
        .ok_or_else(|| anyhow!("sample dataframe has no id column"))?
        .as_any()
        .downcast_ref::<Int64Array>()
        .ok_or_else(|| anyhow!("sample id column is not Int64"))?
        .values()
        .to_vec();

    let mut columns: Vec<Vec<f64>> = Vec::with_capacity(cols.len());
    for name in &cols {
        let array = data
            .column_by_name(name)
            .ok_or_else(|| anyhow!("feature column {} missing", name))?;
        let values: Vec<f64> = if let Some(floats) = array.as_any().downcast_ref::<Float64Array>() {
            floats.values().to_vec()
        } else if let Some(ints) = array.as_any().downcast_ref::<Int64Array>() {
            ints.values().iter().map(|&v| v as f64).collect()
        } else {
            return Err(anyhow!("feature column {} is not numeric", name));
        };
        columns.push(values);
    }

    let rows = (0..data.num_rows())
        .map(|row| columns.iter().map(|col| col[row]).collect())
        .collect();
    Ok((
        sample_ids,
        FeatureMatrix {
            cols,
            rows,
        },
    ))
}

fn threshold(params: &Value, default: f64) -> f64 {
    params
        .get("threshold")
        .and_then(|v| v.as_f64())
        .unwrap_or(default)
}

/// Mean absolute z-score across the feature columns.
///
/// A column with zero variance contributes nothing. Scores are in
/// standard deviations; rows beyond the threshold are flagged.
pub struct ZScoreScorer;

impl Scorer for ZScoreScorer {
    fn fit_score(&self, features: &FeatureMatrix, params: &Value) -> Result<ScoreOutput> {
        let threshold = threshold(params, 3.0);
        let n = features.rows.len();
        if n == 0 {
            return Ok(ScoreOutput {
                scores: Vec::new(),
                predictions: Vec::new(),
            });
        }
        let dims = features.cols.len();

        let mut means = vec![0.0; dims];
        for row in &features.rows {
            for (d, value) in row.iter().enumerate() {
                means[d] += value;
            }
        }
        for mean in &mut means {
            *mean /= n as f64;
        }

        let mut stds = vec![0.0; dims];
        for row in &features.rows {
            for (d, value) in row.iter().enumerate() {
                stds[d] += (value - means[d]).powi(2);
            }
        }
        for std in &mut stds {
            *std = (*std / n as f64).sqrt();
        }

        let scores: Vec<f64> = features
            .rows
            .iter()
            .map(|row| {
                let total: f64 = row
                    .iter()
                    .enumerate()
                    .map(|(d, value)| {
                        if stds[d] > 0.0 {
                            (value - means[d]).abs() / stds[d]
                        } else {
                            0.0
                        }
                    })
                    .sum();
                total / dims as f64
            })
            .collect();
        let predictions = scores.iter().map(|&s| s > threshold).collect();
        Ok(ScoreOutput {
            scores,
            predictions,
        })
    }
}

/// Modified z-score based on the median absolute deviation, more robust
/// to the outliers it is hunting than plain z-scores.
pub struct MadScorer;

impl Scorer for MadScorer {
    fn fit_score(&self, features: &FeatureMatrix, params: &Value) -> Result<ScoreOutput> {
        const MAD_SCALE: f64 = 0.6745;
        let threshold = threshold(params, 3.5);
        let n = features.rows.len();
        if n == 0 {
            return Ok(ScoreOutput {
                scores: Vec::new(),
                predictions: Vec::new(),
            });
        }
        let dims = features.cols.len();

        let mut medians = vec![0.0; dims];
        let mut mads = vec![0.0; dims];
        for d in 0..dims {
            let mut column: Vec<f64> = features.rows.iter().map(|row| row[d]).collect();
            medians[d] = median(&mut column);
            let mut deviations: Vec<f64> =
                column.iter().map(|v| (v - medians[d]).abs()).collect();
            mads[d] = median(&mut deviations);
        }

        let scores: Vec<f64> = features
            .rows
            .iter()
            .map(|row| {
                let total: f64 = row
                    .iter()
                    .enumerate()
                    .map(|(d, value)| {
                        if mads[d] > 0.0 {
                            MAD_SCALE * (value - medians[d]).abs() / mads[d]
                        } else {
                            0.0
                        }
                    })
                    .sum();
                total / dims as f64
            })
            .collect();
        let predictions = scores.iter().map(|&s| s > threshold).collect();
        Ok(ScoreOutput {
            scores,
            predictions,
        })
    }
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}
