//! The score sink: context resolution plus two insertion strategies.

use crate::partition::{partition_indexes, PartitionMode};
use crate::{
    joined_scores_schema, SinkError, SinkResult, OUTLIER_SCORE_COLUMNS,
};
use arrow::array::{ArrayRef, BooleanArray, Float64Array, Int64Array, RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use driftmark_db::{Context, OutlierScoreRow, ProvenanceDb};
use driftmark_protocol::{RunId, SinkConfig, WriteStrategy};
use sqlx::Row;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Outcome of a successful save.
#[derive(Debug, Clone, Copy)]
pub struct SaveReport {
    pub context_id: i64,
    pub rows_written: u64,
    pub chunks: usize,
}

/// Persists score batches under fresh contexts.
///
/// The strategy is fixed at construction time; every batch saved through
/// one sink uses the same insertion path and chunk size.
pub struct ScoreSink {
    db: ProvenanceDb,
    config: SinkConfig,
}

impl ScoreSink {
    pub fn new(db: ProvenanceDb, config: SinkConfig) -> Self {
        Self { db, config }
    }

    /// Persist one score batch.
    ///
    /// The batch's `run_id`, `algorithm` and `parameters` are read from
    /// the first row; they are assumed uniform across the batch and not
    /// re-validated per row. A fresh context is created (fail-fast), its
    /// id attached to every row, and the redundant triple columns
    /// dropped before insertion.
    pub async fn save(&self, data: &RecordBatch) -> SinkResult<SaveReport> {
        if data.num_rows() == 0 {
            return Err(SinkError::invalid("empty score batch"));
        }

        let run_id = string_column(data, "run_id")?.value(0);
        let algorithm = string_column(data, "algorithm")?.value(0);
        let parameters = string_column(data, "parameters")?.value(0);
        let run_id = RunId::parse(run_id)
            .map_err(|e| SinkError::invalid(format!("bad run_id in batch: {}", e)))?;

        let context = self.db.resolve_context(&run_id, algorithm, parameters).await;
        let projected = attach_context(data, &context)?;

        let report = match self.config.strategy {
            WriteStrategy::RowAppend => self.save_rows(&projected, context.id).await?,
            WriteStrategy::BulkStream => self.save_streaming(&projected, context.id).await?,
        };
        info!(
            context_id = report.context_id,
            rows = report.rows_written,
            chunks = report.chunks,
            "score batch persisted"
        );
        Ok(report)
    }

    /// Row-oriented append: prepared statements in per-chunk
    /// transactions. Chunks commit independently; a failure leaves the
    /// committed prefix in place and propagates to the caller.
    async fn save_rows(&self, projected: &RecordBatch, context_id: i64) -> SinkResult<SaveReport> {
        let sample_ids = int64_column(projected, "sample_id")?;
        let scores = float64_column(projected, "score")?;
        let predictions = boolean_column(projected, "prediction")?;

        let total = projected.num_rows();
        let mut rows_written = 0u64;
        let mut chunks = 0usize;
        let mut start = 0usize;
        while start < total {
            let end = (start + self.config.chunk_size).min(total);
            let mut tx = self.db.pool().begin().await?;
            for row in start..end {
                sqlx::query(
                    r#"
                    INSERT INTO outlier_score (sample_id, score, prediction, context_id)
                    VALUES (?, ?, ?, ?)
                    "#,
                )
                .bind(sample_ids.value(row))
                .bind(scores.value(row))
                .bind(predictions.value(row))
                .bind(context_id)
                .execute(&mut *tx)
                .await?;
            }
            tx.commit().await?;
            rows_written += (end - start) as u64;
            chunks += 1;
            debug!(rows = end - start, "score chunk appended");
            start = end;
        }

        Ok(SaveReport {
            context_id,
            rows_written,
            chunks,
        })
    }

    /// Bulk streaming: each partition is serialized to an in-memory
    /// delimited buffer (no header, no index column) and loaded in a
    /// single transaction with the fixed column order of
    /// [`OUTLIER_SCORE_COLUMNS`]. Chunks commit independently; a chunk
    /// failure rolls back, is logged, and terminates the process -
    /// previously committed chunks remain.
    async fn save_streaming(
        &self,
        projected: &RecordBatch,
        context_id: i64,
    ) -> SinkResult<SaveReport> {
        let mode = if self.config.legacy_partitioning {
            PartitionMode::Legacy
        } else {
            PartitionMode::Exact
        };
        let ranges = partition_indexes(projected.num_rows(), self.config.chunk_size, mode);

        let mut rows_written = 0u64;
        for &(start, end) in &ranges {
            let slice = projected.slice(start, end - start + 1);
            let buffer = serialize_chunk(&slice)?;
            match self.stream_chunk(&buffer).await {
                Ok(rows) => rows_written += rows,
                Err(err) => {
                    error!(%err, start, end, "bulk stream chunk failed, aborting");
                    std::process::exit(1);
                }
            }
        }

        Ok(SaveReport {
            context_id,
            rows_written,
            chunks: ranges.len(),
        })
    }

    /// Load a delimited buffer into `outlier_score` in one transaction.
    async fn stream_chunk(&self, buffer: &[u8]) -> SinkResult<u64> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(buffer);

        let mut tx = self.db.pool().begin().await?;
        let mut rows = 0u64;
        for record in reader.records() {
            let record = record?;
            if record.len() != OUTLIER_SCORE_COLUMNS.len() {
                return Err(SinkError::invalid(format!(
                    "expected {} delimited fields, got {}",
                    OUTLIER_SCORE_COLUMNS.len(),
                    record.len()
                )));
            }
            let row = OutlierScoreRow {
                sample_id: parse_field(&record, 0)?,
                score: parse_field(&record, 1)?,
                prediction: parse_field(&record, 2)?,
                context_id: parse_field(&record, 3)?,
            };

            sqlx::query(
                r#"
                INSERT INTO outlier_score (sample_id, score, prediction, context_id)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(row.sample_id)
            .bind(row.score)
            .bind(row.prediction)
            .bind(row.context_id)
            .execute(&mut *tx)
            .await?;
            rows += 1;
        }
        tx.commit().await?;
        Ok(rows)
    }

    /// Reconstruct the joined view of contexts and scores.
    ///
    /// Read failures are non-fatal: the error is logged and an empty
    /// batch returned, indistinguishable from a legitimately empty
    /// table.
    pub async fn load(&self) -> RecordBatch {
        match self.try_load().await {
            Ok(batch) => batch,
            Err(err) => {
                error!(%err, "failed to load joined scores");
                RecordBatch::new_empty(joined_scores_schema())
            }
        }
    }

    async fn try_load(&self) -> SinkResult<RecordBatch> {
        let rows = sqlx::query(
            r#"
            SELECT c.run_id, c.algorithm, c.parameters,
                   os.context_id, os.sample_id, os.score, os.prediction
            FROM contexts c
            JOIN outlier_score os ON os.context_id = c.id
            ORDER BY os.context_id, os.sample_id
            "#,
        )
        .fetch_all(self.db.pool())
        .await?;

        let mut run_ids = Vec::with_capacity(rows.len());
        let mut algorithms = Vec::with_capacity(rows.len());
        let mut parameters = Vec::with_capacity(rows.len());
        let mut context_ids = Vec::with_capacity(rows.len());
        let mut sample_ids = Vec::with_capacity(rows.len());
        let mut scores = Vec::with_capacity(rows.len());
        let mut predictions = Vec::with_capacity(rows.len());
        for row in &rows {
            run_ids.push(row.get::<String, _>("run_id"));
            algorithms.push(row.get::<String, _>("algorithm"));
            parameters.push(row.get::<String, _>("parameters"));
            context_ids.push(row.get::<i64, _>("context_id"));
            sample_ids.push(row.get::<i64, _>("sample_id"));
            scores.push(row.get::<f64, _>("score"));
            predictions.push(row.get::<bool, _>("prediction"));
        }

        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(run_ids)),
            Arc::new(StringArray::from(algorithms)),
            Arc::new(StringArray::from(parameters)),
            Arc::new(Int64Array::from(context_ids)),
            Arc::new(Int64Array::from(sample_ids)),
            Arc::new(Float64Array::from(scores)),
            Arc::new(BooleanArray::from(predictions)),
        ];
        Ok(RecordBatch::try_new(joined_scores_schema(), columns)?)
    }
}

/// Project a score batch to the persisted shape, attaching the context
/// id and dropping the redundant run/algorithm/parameters columns.
fn attach_context(data: &RecordBatch, context: &Context) -> SinkResult<RecordBatch> {
    let rows = data.num_rows();
    let schema = Arc::new(Schema::new(vec![
        Field::new("sample_id", DataType::Int64, false),
        Field::new("score", DataType::Float64, false),
        Field::new("prediction", DataType::Boolean, false),
        Field::new("context_id", DataType::Int64, false),
    ]));
    let columns: Vec<ArrayRef> = vec![
        column(data, "sample_id")?.clone(),
        column(data, "score")?.clone(),
        column(data, "prediction")?.clone(),
        Arc::new(Int64Array::from(vec![context.id; rows])),
    ];
    Ok(RecordBatch::try_new(schema, columns)?)
}

/// Serialize one slice to a delimited buffer: no header, no index
/// column, columns in [`OUTLIER_SCORE_COLUMNS`] order.
fn serialize_chunk(slice: &RecordBatch) -> SinkResult<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut writer = arrow::csv::WriterBuilder::new()
        .with_header(false)
        .build(&mut buffer);
    writer.write(slice)?;
    drop(writer);
    Ok(buffer)
}

fn parse_field<T: std::str::FromStr>(record: &csv::StringRecord, index: usize) -> SinkResult<T>
where
    T::Err: std::fmt::Display,
{
    record[index].parse::<T>().map_err(|e| {
        SinkError::invalid(format!(
            "bad value for {}: {}",
            OUTLIER_SCORE_COLUMNS[index], e
        ))
    })
}

fn column<'a>(batch: &'a RecordBatch, name: &str) -> SinkResult<&'a ArrayRef> {
    batch
        .column_by_name(name)
        .ok_or_else(|| SinkError::invalid(format!("missing column: {}", name)))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> SinkResult<&'a StringArray> {
    column(batch, name)?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| SinkError::invalid(format!("column {} is not Utf8", name)))
}

fn int64_column<'a>(batch: &'a RecordBatch, name: &str) -> SinkResult<&'a Int64Array> {
    column(batch, name)?
        .as_any()
        .downcast_ref::<Int64Array>()
        .ok_or_else(|| SinkError::invalid(format!("column {} is not Int64", name)))
}

fn float64_column<'a>(batch: &'a RecordBatch, name: &str) -> SinkResult<&'a Float64Array> {
    column(batch, name)?
        .as_any()
        .downcast_ref::<Float64Array>()
        .ok_or_else(|| SinkError::invalid(format!("column {} is not Float64", name)))
}

fn boolean_column<'a>(batch: &'a RecordBatch, name: &str) -> SinkResult<&'a BooleanArray> {
    column(batch, name)?
        .as_any()
        .downcast_ref::<BooleanArray>()
        .ok_or_else(|| SinkError::invalid(format!("column {} is not Boolean", name)))
}
