//! Registered score views.
//!
//! A view is forward-declared before scoring executes, keyed by values
//! that will exist once the batch is written; its query returns no rows
//! until the matching context and score rows commit. Pending definitions
//! are emitted together with the schema after a successful pipeline run.

use crate::error::Result;
use crate::ProvenanceDb;
use chrono::Utc;
use driftmark_protocol::RunId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::info;

// Disambiguates registrations landing on the same microsecond.
static VIEW_SEQ: AtomicU64 = AtomicU64::new(0);

/// A named view definition awaiting emission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewDef {
    pub name: String,
    pub select_sql: String,
}

/// Collects view definitions during a run.
///
/// Cheaply clonable; the hooks and the scoring nodes share one registry.
#[derive(Debug, Clone, Default)]
pub struct ViewRegistry {
    pending: Arc<Mutex<Vec<ViewDef>>>,
}

impl ViewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a view joining `samples`, `contexts` and `outlier_score`,
    /// filtered to one run/algorithm/parameters triple. The algorithm is
    /// matched by display name and the parameters by exact serialized
    /// string equality. The name is derived from the current timestamp so
    /// repeated registrations never collide.
    pub fn register_score_view(
        &self,
        run_id: &RunId,
        algorithm_name: &str,
        parameters_json: &str,
    ) -> String {
        let name = format!(
            "samples_scores_{}_{}",
            Utc::now().timestamp_micros(),
            VIEW_SEQ.fetch_add(1, Ordering::Relaxed),
        );
        let select_sql = format!(
            "SELECT s.*, c.run_id, c.algorithm, c.parameters, os.score, os.prediction \
             FROM samples s \
             JOIN outlier_score os ON os.sample_id = s.id \
             JOIN contexts c ON c.id = os.context_id \
             WHERE c.run_id = '{}' AND c.algorithm = '{}' AND c.parameters = '{}'",
            escape_literal(run_id.as_str()),
            escape_literal(algorithm_name),
            escape_literal(parameters_json),
        );
        self.push(ViewDef {
            name: name.clone(),
            select_sql,
        });
        name
    }

    fn push(&self, def: ViewDef) {
        self.pending
            .lock()
            .expect("view registry lock poisoned")
            .push(def);
    }

    /// Take every pending definition, leaving the registry empty.
    pub fn drain(&self) -> Vec<ViewDef> {
        std::mem::take(
            &mut *self
                .pending
                .lock()
                .expect("view registry lock poisoned"),
        )
    }

    pub fn pending_count(&self) -> usize {
        self.pending
            .lock()
            .expect("view registry lock poisoned")
            .len()
    }
}

/// Escape a string for inlining into view DDL (views cannot carry bind
/// parameters).
fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

impl ProvenanceDb {
    /// Create every pending view. Invoked with `ensure_schema` after a
    /// successful pipeline run.
    pub async fn emit_views(&self, registry: &ViewRegistry) -> Result<()> {
        for def in registry.drain() {
            sqlx::query(&format!(
                "CREATE VIEW IF NOT EXISTS \"{}\" AS {}",
                def.name, def.select_sql
            ))
            .execute(self.pool())
            .await?;
            info!(view = %def.name, "score view created");
        }
        Ok(())
    }
}
