//! End-to-end sink behavior against an in-memory store.

use arrow::array::{BooleanArray, Float64Array, Int64Array, StringArray};
use driftmark_db::ProvenanceDb;
use driftmark_protocol::{RunId, SinkConfig, WriteStrategy};
use driftmark_sinks::{build_score_batch, ScoreSink};

async fn store_with_samples(n: i64) -> ProvenanceDb {
    let db = ProvenanceDb::open_memory().await.unwrap();
    db.ensure_schema().await.unwrap();
    sqlx::query("CREATE TABLE samples (id BIGINT PRIMARY KEY, temp FLOAT)")
        .execute(db.pool())
        .await
        .unwrap();
    for id in 1..=n {
        sqlx::query("INSERT INTO samples (id, temp) VALUES (?, ?)")
            .bind(id)
            .bind(20.0 + id as f64)
            .execute(db.pool())
            .await
            .unwrap();
    }
    db
}

fn sample_batch(run_id: &RunId, n: usize) -> arrow::array::RecordBatch {
    let sample_ids: Vec<i64> = (1..=n as i64).collect();
    let scores: Vec<f64> = (0..n).map(|i| i as f64 * 0.25).collect();
    let predictions: Vec<bool> = (0..n).map(|i| i % 7 == 0).collect();
    build_score_batch(
        &sample_ids,
        &scores,
        &predictions,
        run_id.as_str(),
        "Z-Score",
        r#"{"cols":["temp"],"threshold":3.0}"#,
    )
    .unwrap()
}

async fn roundtrip(strategy: WriteStrategy) {
    let db = store_with_samples(25).await;
    let run_id = RunId::new();
    let sink = ScoreSink::new(
        db.clone(),
        SinkConfig {
            strategy,
            chunk_size: 10,
            legacy_partitioning: false,
        },
    );

    let batch = sample_batch(&run_id, 25);
    let report = sink.save(&batch).await.unwrap();
    assert_eq!(report.rows_written, 25);
    assert_eq!(report.chunks, 3);

    let loaded = sink.load().await;
    assert_eq!(loaded.num_rows(), 25);

    let run_ids = loaded
        .column_by_name("run_id")
        .unwrap()
        .as_any()
        .downcast_ref::<StringArray>()
        .unwrap();
    let algorithms = loaded
        .column_by_name("algorithm")
        .unwrap()
        .as_any()
        .downcast_ref::<StringArray>()
        .unwrap();
    let sample_ids = loaded
        .column_by_name("sample_id")
        .unwrap()
        .as_any()
        .downcast_ref::<Int64Array>()
        .unwrap();
    let scores = loaded
        .column_by_name("score")
        .unwrap()
        .as_any()
        .downcast_ref::<Float64Array>()
        .unwrap();
    let predictions = loaded
        .column_by_name("prediction")
        .unwrap()
        .as_any()
        .downcast_ref::<BooleanArray>()
        .unwrap();

    for row in 0..25 {
        assert_eq!(run_ids.value(row), run_id.as_str());
        assert_eq!(algorithms.value(row), "Z-Score");
        assert_eq!(sample_ids.value(row), row as i64 + 1);
        assert!((scores.value(row) - row as f64 * 0.25).abs() < 1e-9);
        assert_eq!(predictions.value(row), row % 7 == 0);
    }
}

#[tokio::test]
async fn row_append_roundtrip() {
    roundtrip(WriteStrategy::RowAppend).await;
}

#[tokio::test]
async fn bulk_stream_roundtrip() {
    roundtrip(WriteStrategy::BulkStream).await;
}

#[tokio::test]
async fn identical_batches_stay_isolated() {
    let db = store_with_samples(5).await;
    let run_id = RunId::new();
    let sink = ScoreSink::new(db.clone(), SinkConfig::default());

    let batch = sample_batch(&run_id, 5);
    let first = sink.save(&batch).await.unwrap();
    let second = sink.save(&batch).await.unwrap();

    // Same run/algorithm/parameters, two distinct contexts.
    assert_ne!(first.context_id, second.context_id);

    let per_context: Vec<(i64, i64)> = sqlx::query_as(
        "SELECT context_id, COUNT(*) FROM outlier_score GROUP BY context_id ORDER BY context_id",
    )
    .fetch_all(db.pool())
    .await
    .unwrap();
    assert_eq!(
        per_context,
        vec![(first.context_id, 5), (second.context_id, 5)]
    );
}

#[tokio::test]
async fn legacy_partitioning_drops_trailing_rows() {
    let db = store_with_samples(25).await;
    let run_id = RunId::new();
    let sink = ScoreSink::new(
        db.clone(),
        SinkConfig {
            strategy: WriteStrategy::BulkStream,
            chunk_size: 10,
            legacy_partitioning: true,
        },
    );

    let report = sink.save(&sample_batch(&run_id, 25)).await.unwrap();
    assert_eq!(report.rows_written, 22);
    assert_eq!(report.chunks, 2);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM outlier_score")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(count, 22);
}

#[tokio::test]
async fn load_failure_returns_empty_batch() {
    // No schema at all: the join cannot run, the load must not fail.
    let db = ProvenanceDb::open_memory().await.unwrap();
    let sink = ScoreSink::new(db, SinkConfig::default());
    let loaded = sink.load().await;
    assert_eq!(loaded.num_rows(), 0);
}

#[tokio::test]
async fn empty_batch_is_rejected() {
    let db = store_with_samples(0).await;
    let sink = ScoreSink::new(db, SinkConfig::default());
    let batch = build_score_batch(&[], &[], &[], "r", "a", "{}").unwrap();
    assert!(sink.save(&batch).await.is_err());
}
