//! Context resolution: the scope row for one score batch.

use crate::error::Result;
use crate::types::Context;
use crate::ProvenanceDb;
use driftmark_protocol::RunId;
use tracing::error;

impl ProvenanceDb {
    /// Create the context row for a score batch about to be persisted.
    ///
    /// Always inserts a fresh row - never lookup-or-create - so two
    /// batches with identical run/algorithm/parameters get distinct
    /// surrogate ids and never share score rows.
    ///
    /// Unlike the audit writes, a failure here terminates the process:
    /// a score batch without a context has nowhere safe to go, and
    /// proceeding silently would orphan the whole batch.
    pub async fn resolve_context(
        &self,
        run_id: &RunId,
        algorithm: &str,
        parameters: &str,
    ) -> Context {
        match self.try_insert_context(run_id, algorithm, parameters).await {
            Ok(context) => context,
            Err(err) => {
                error!(%err, algorithm, "failed to create score context, aborting");
                std::process::exit(1);
            }
        }
    }

    /// Fallible context insertion. `resolve_context` is the production
    /// entry point; this exists so the insertion itself stays testable.
    pub async fn try_insert_context(
        &self,
        run_id: &RunId,
        algorithm: &str,
        parameters: &str,
    ) -> Result<Context> {
        let mut tx = self.pool().begin().await?;
        let result = sqlx::query(
            r#"
            INSERT INTO contexts (run_id, algorithm, parameters)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(run_id.as_str())
        .bind(algorithm)
        .bind(parameters)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(Context {
            id: result.last_insert_rowid(),
            run_id: run_id.as_str().to_string(),
            algorithm: algorithm.to_string(),
            parameters: parameters.to_string(),
        })
    }
}
