//! Audit writes: lifecycle events and content-addressed snapshots.
//!
//! Every operation here is best-effort. A failed audit write is logged
//! and swallowed so that provenance logging can never break the primary
//! data pipeline; losing an event row is tolerated, degraded
//! observability rather than degraded correctness.

use crate::error::Result;
use crate::hash::short_hash;
use crate::types::{Catalog, Event, EventKind, PipelineRecord};
use crate::ProvenanceDb;
use chrono::Utc;
use driftmark_protocol::RunId;
use tracing::error;

impl ProvenanceDb {
    /// Append one lifecycle event.
    ///
    /// The target is stored as its short hash; `target_name` keeps the
    /// human-readable name where one exists (datasets). Returns `None`
    /// on any store failure after rolling back - callers must not abort
    /// pipeline execution over a failed audit write.
    pub async fn record_event(
        &self,
        run_id: &RunId,
        event_type: EventKind,
        target: &str,
        target_name: Option<&str>,
    ) -> Option<Event> {
        match self.try_record_event(run_id, event_type, target, target_name).await {
            Ok(event) => Some(event),
            Err(err) => {
                error!(%err, event_type = %event_type, "failed to record event");
                None
            }
        }
    }

    async fn try_record_event(
        &self,
        run_id: &RunId,
        event_type: EventKind,
        target: &str,
        target_name: Option<&str>,
    ) -> Result<Event> {
        let timestamp = Utc::now();
        let target_id = short_hash(target);

        let mut tx = self.pool().begin().await?;
        let result = sqlx::query(
            r#"
            INSERT INTO events (run_id, event_type, target_id, target_name, timestamp)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(run_id.as_str())
        .bind(event_type.as_str())
        .bind(&target_id)
        .bind(target_name)
        .bind(timestamp)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(Event {
            id: result.last_insert_rowid(),
            run_id: run_id.as_str().to_string(),
            event_type,
            target_id,
            target_name: target_name.map(str::to_string),
            timestamp,
        })
    }

    /// Merge a catalog snapshot, keyed by the hash of its serialized
    /// content. Writing identical content twice is a no-op merge.
    pub async fn upsert_catalog(&self, content: &serde_json::Value) -> Option<Catalog> {
        match self.try_upsert_catalog(content).await {
            Ok(catalog) => Some(catalog),
            Err(err) => {
                error!(%err, "failed to upsert catalog");
                None
            }
        }
    }

    async fn try_upsert_catalog(&self, content: &serde_json::Value) -> Result<Catalog> {
        let serialized = serde_json::to_string(content)?;
        let hash = short_hash(&serialized);

        let mut tx = self.pool().begin().await?;
        sqlx::query(
            r#"
            INSERT INTO catalogs (hash, content)
            VALUES (?, ?)
            ON CONFLICT(hash) DO UPDATE SET content = excluded.content
            "#,
        )
        .bind(&hash)
        .bind(&serialized)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(Catalog {
            hash,
            content: serialized,
        })
    }

    /// Merge a pipeline snapshot, keyed by the hash of `target` (the
    /// pipeline's canonical representation).
    pub async fn upsert_pipeline(
        &self,
        target: &str,
        name: &str,
        content: &serde_json::Value,
    ) -> Option<PipelineRecord> {
        match self.try_upsert_pipeline(target, name, content).await {
            Ok(pipeline) => Some(pipeline),
            Err(err) => {
                error!(%err, name, "failed to upsert pipeline");
                None
            }
        }
    }

    async fn try_upsert_pipeline(
        &self,
        target: &str,
        name: &str,
        content: &serde_json::Value,
    ) -> Result<PipelineRecord> {
        let serialized = serde_json::to_string(content)?;
        let hash = short_hash(target);

        let mut tx = self.pool().begin().await?;
        sqlx::query(
            r#"
            INSERT INTO pipelines (hash, name, content)
            VALUES (?, ?, ?)
            ON CONFLICT(hash) DO UPDATE SET
                name = excluded.name,
                content = excluded.content
            "#,
        )
        .bind(&hash)
        .bind(name)
        .bind(&serialized)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(PipelineRecord {
            hash,
            name: name.to_string(),
            content: serialized,
        })
    }
}
