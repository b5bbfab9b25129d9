//! Full plugin lifecycle against an in-memory store: hooks, gateway
//! validation, scoring, sink persistence, and view emission.

use arrow::array::{Float64Array, Int64Array, RecordBatch};
use arrow::datatypes::{DataType, Field, Schema};
use driftmark::gateway::NodeValue;
use driftmark::{
    score_node, GatewayRegistry, NodeData, NodeInfo, NumericInputValidator, PipelineSpec,
    ProvenanceDb, RunHooks, RunParams, ScoreSink, ScorerRegistry, SinkConfig, ViewRegistry,
};
use serde_json::json;
use std::sync::Arc;

async fn provisioned_store() -> ProvenanceDb {
    let db = ProvenanceDb::open_memory().await.unwrap();
    db.ensure_schema().await.unwrap();
    sqlx::query("CREATE TABLE samples (id BIGINT PRIMARY KEY, temp FLOAT)")
        .execute(db.pool())
        .await
        .unwrap();
    db
}

fn weather_frame(temps: &[f64]) -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("temp", DataType::Float64, false),
    ]));
    let ids: Vec<i64> = (1..=temps.len() as i64).collect();
    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Int64Array::from(ids)),
            Arc::new(Float64Array::from(temps.to_vec())),
        ],
    )
    .unwrap()
}

async fn seed_samples(db: &ProvenanceDb, temps: &[f64]) {
    for (i, temp) in temps.iter().enumerate() {
        sqlx::query("INSERT INTO samples (id, temp) VALUES (?, ?)")
            .bind(i as i64 + 1)
            .bind(*temp)
            .execute(db.pool())
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn full_run_persists_events_scores_and_views() {
    let db = provisioned_store().await;
    // Eight readings: a single-outlier z-score tops out at sqrt(n-1), so
    // the 55.0 reading clears the 2.0 threshold only with enough inliers.
    let temps = [20.0, 20.4, 19.8, 20.1, 20.3, 19.9, 20.2, 55.0];
    seed_samples(&db, &temps).await;

    let mut gateways = GatewayRegistry::new();
    gateways.register("ad", Arc::new(NumericInputValidator));
    let views = ViewRegistry::new();
    let scorers = ScorerRegistry::with_builtins();
    let hooks = RunHooks::new(db.clone(), views.clone(), gateways);

    let catalog = json!({"weather": {"type": "csv", "filepath": "weather.csv"}});
    let pipeline = PipelineSpec::new("ad", json!({"nodes": ["score_weather"]}));
    let params = json!({"cols": ["temp"], "threshold": 2.0});

    hooks.after_catalog_created(&catalog).await;
    hooks
        .before_pipeline_run(&RunParams::default(), &pipeline)
        .await;

    hooks.before_dataset_loaded("weather").await;
    let data = weather_frame(&temps);
    hooks.after_dataset_loaded("weather").await;

    let node = NodeInfo::new("score_weather").with_tag("ad");
    let mut inputs = NodeData::new();
    inputs.insert("weather".into(), NodeValue::Batch(data.clone()));
    inputs.insert("params:ad".into(), NodeValue::Params(params.clone()));
    hooks.before_node_run(&node, &inputs).await.unwrap();

    let scores = score_node(
        &data,
        &params,
        hooks.run_id(),
        &scorers,
        "zscore",
        hooks.views(),
    )
    .unwrap();

    let sink = ScoreSink::new(db.clone(), SinkConfig::default());
    let report = sink.save(&scores).await.unwrap();
    assert_eq!(report.rows_written, 8);

    hooks.after_node_run(&node, &NodeData::new()).await.unwrap();
    hooks.after_pipeline_run(&pipeline).await.unwrap();

    // All lifecycle events landed under the run id.
    let event_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM events WHERE run_id = ?")
        .bind(hooks.run_id().as_str())
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(event_count, 7);

    // Catalog and pipeline snapshots are content-addressed singletons.
    let catalog_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM catalogs")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(catalog_count, 1);

    // The forward-declared view was emitted and now sees the batch.
    let view_name: String = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'view' AND name LIKE 'samples_scores_%'",
    )
    .fetch_one(db.pool())
    .await
    .unwrap();
    let view_rows: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM \"{}\"", view_name))
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(view_rows, 8);

    // The 55.0 reading is the outlier the view surfaces.
    let flagged: i64 =
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM \"{}\" WHERE prediction = 1", view_name))
            .fetch_one(db.pool())
            .await
            .unwrap();
    assert_eq!(flagged, 1);
}

#[tokio::test]
async fn gateway_rejection_propagates_before_node_runs() {
    let db = provisioned_store().await;
    let mut gateways = GatewayRegistry::new();
    gateways.register("ad", Arc::new(NumericInputValidator));
    let hooks = RunHooks::new(db.clone(), ViewRegistry::new(), gateways);

    let node = NodeInfo::new("score_weather").with_tag("ad");
    // No dataset in the inputs: the validator must fail the node.
    assert!(hooks.before_node_run(&node, &NodeData::new()).await.is_err());
}

#[tokio::test]
async fn event_outage_does_not_poison_score_writes() {
    let db = provisioned_store().await;
    seed_samples(&db, &[1.0, 2.0, 3.0]).await;
    let hooks = RunHooks::new(db.clone(), ViewRegistry::new(), GatewayRegistry::new());

    // Simulate an outage of the audit log only.
    sqlx::query("DROP TABLE events")
        .execute(db.pool())
        .await
        .unwrap();
    hooks.before_dataset_loaded("weather").await; // swallowed

    // Context and score writes still succeed in the same run.
    let scores = score_node(
        &weather_frame(&[1.0, 2.0, 3.0]),
        &json!({"cols": ["temp"]}),
        hooks.run_id(),
        &ScorerRegistry::with_builtins(),
        "mad",
        hooks.views(),
    )
    .unwrap();
    let sink = ScoreSink::new(db.clone(), SinkConfig::default());
    let report = sink.save(&scores).await.unwrap();
    assert_eq!(report.rows_written, 3);
}

#[tokio::test]
async fn failed_run_emits_no_views() {
    let db = provisioned_store().await;
    let views = ViewRegistry::new();
    let hooks = RunHooks::new(db.clone(), views.clone(), GatewayRegistry::new());

    let pipeline = PipelineSpec::new("ad", json!({"nodes": ["score_weather"]}));
    hooks
        .before_pipeline_run(&RunParams::default(), &pipeline)
        .await;
    views.register_score_view(hooks.run_id(), "Z-Score", "{}");
    hooks.on_pipeline_error(&pipeline).await;

    // No after_pipeline_run: registered views stay pending, none emitted.
    assert_eq!(views.pending_count(), 1);
    let view_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type = 'view'")
            .fetch_one(db.pool())
            .await
            .unwrap();
    assert_eq!(view_count, 0);
}
