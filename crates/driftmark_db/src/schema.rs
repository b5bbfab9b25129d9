//! Schema creation for the Driftmark tables.
//!
//! All CREATE TABLE statements live here - single source of truth.
//! `ensure_schema` is idempotent and invoked by the hooks only after a
//! successful pipeline run, so failed runs never churn the schema.

use crate::error::Result;
use crate::ProvenanceDb;
use tracing::info;

impl ProvenanceDb {
    /// Ensure all Driftmark tables exist.
    ///
    /// The external `samples` table is deliberately not created here: its
    /// shape is per-deployment, the only contract being an `id` column
    /// that `outlier_score.sample_id` references.
    pub async fn ensure_schema(&self) -> Result<()> {
        // Append-only lifecycle audit log
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id CHAR(36) NOT NULL,
                event_type TEXT NOT NULL,
                target_id VARCHAR(8) NOT NULL,
                target_name TEXT,
                timestamp TIMESTAMP NOT NULL
            )"#,
        )
        .execute(self.pool())
        .await?;

        // Content-addressed catalog snapshots
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS catalogs (
                hash VARCHAR(8) NOT NULL PRIMARY KEY,
                content TEXT NOT NULL
            )"#,
        )
        .execute(self.pool())
        .await?;

        // Content-addressed pipeline snapshots
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS pipelines (
                hash VARCHAR(8) NOT NULL PRIMARY KEY,
                name TEXT NOT NULL,
                content TEXT NOT NULL
            )"#,
        )
        .execute(self.pool())
        .await?;

        // Score batch scopes
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS contexts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id CHAR(36) NOT NULL,
                algorithm TEXT NOT NULL,
                parameters TEXT NOT NULL
            )"#,
        )
        .execute(self.pool())
        .await?;

        // Anomaly scores, one row per (context, sample)
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS outlier_score (
                context_id INT NOT NULL REFERENCES contexts(id),
                sample_id BIGINT NOT NULL REFERENCES samples(id),
                score FLOAT NOT NULL,
                prediction BOOLEAN,
                PRIMARY KEY (context_id, sample_id)
            )"#,
        )
        .execute(self.pool())
        .await?;

        // Index on score for range queries over results
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_os_score ON outlier_score(score)")
            .execute(self.pool())
            .await?;

        info!("provenance schema verified");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ensure_schema_is_idempotent() {
        let db = ProvenanceDb::open_memory().await.unwrap();
        db.ensure_schema().await.unwrap();
        db.ensure_schema().await.unwrap();

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(db.pool())
        .await
        .unwrap();
        assert_eq!(
            tables,
            vec!["catalogs", "contexts", "events", "outlier_score", "pipelines"]
        );
    }
}
