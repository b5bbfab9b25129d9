//! Batch score persistence for Driftmark.
//!
//! A score batch is an Arrow `RecordBatch`. The sink resolves the batch's
//! context, strips the columns the context makes redundant, and persists
//! the rows with one of two insertion strategies.

use arrow::array::{ArrayRef, BooleanArray, Float64Array, Int64Array, RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use std::sync::Arc;
use thiserror::Error;

pub mod partition;
mod score;

pub use partition::{partition_indexes, PartitionMode};
pub use score::{SaveReport, ScoreSink};

/// Column order used when streaming score rows through a delimited
/// buffer. A buffer has no column-name binding, so this order is the
/// contract between serialization and the receiving table.
pub const OUTLIER_SCORE_COLUMNS: [&str; 4] = ["sample_id", "score", "prediction", "context_id"];

/// Errors returned by sink operations.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Store error: {0}")]
    Db(#[from] driftmark_db::DbError),

    #[error("Store error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Buffer error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid score batch: {0}")]
    InvalidBatch(String),
}

pub type SinkResult<T> = std::result::Result<T, SinkError>;

impl SinkError {
    fn invalid(message: impl Into<String>) -> Self {
        SinkError::InvalidBatch(message.into())
    }
}

/// Schema of a freshly computed score batch, before context resolution.
pub fn score_batch_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("sample_id", DataType::Int64, false),
        Field::new("score", DataType::Float64, false),
        Field::new("prediction", DataType::Boolean, false),
        Field::new("run_id", DataType::Utf8, false),
        Field::new("algorithm", DataType::Utf8, false),
        Field::new("parameters", DataType::Utf8, false),
    ]))
}

/// Schema of the joined contexts/outlier_score load result.
pub fn joined_scores_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("run_id", DataType::Utf8, false),
        Field::new("algorithm", DataType::Utf8, false),
        Field::new("parameters", DataType::Utf8, false),
        Field::new("context_id", DataType::Int64, false),
        Field::new("sample_id", DataType::Int64, false),
        Field::new("score", DataType::Float64, false),
        Field::new("prediction", DataType::Boolean, false),
    ]))
}

/// Assemble a score batch from parallel vectors.
///
/// `run_id`, `algorithm` and `parameters` are broadcast across the batch:
/// one scoring call shares exactly one triple.
pub fn build_score_batch(
    sample_ids: &[i64],
    scores: &[f64],
    predictions: &[bool],
    run_id: &str,
    algorithm: &str,
    parameters: &str,
) -> SinkResult<RecordBatch> {
    if sample_ids.len() != scores.len() || scores.len() != predictions.len() {
        return Err(SinkError::invalid(format!(
            "column lengths differ: {} ids, {} scores, {} predictions",
            sample_ids.len(),
            scores.len(),
            predictions.len()
        )));
    }
    let rows = sample_ids.len();
    let columns: Vec<ArrayRef> = vec![
        Arc::new(Int64Array::from(sample_ids.to_vec())),
        Arc::new(Float64Array::from(scores.to_vec())),
        Arc::new(BooleanArray::from(predictions.to_vec())),
        Arc::new(StringArray::from(vec![run_id; rows])),
        Arc::new(StringArray::from(vec![algorithm; rows])),
        Arc::new(StringArray::from(vec![parameters; rows])),
    ];
    Ok(RecordBatch::try_new(score_batch_schema(), columns)?)
}
