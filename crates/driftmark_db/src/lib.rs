//! Provenance store for Driftmark.
//!
//! This crate is the single source of truth for all store operations:
//! lifecycle events, content-addressed catalog/pipeline snapshots, score
//! contexts, and the registered score views. All plugin components go
//! through [`ProvenanceDb`]; nothing else talks to the store directly.
//!
//! # Usage
//!
//! ```rust,ignore
//! use driftmark_db::{ProvenanceDb, Result};
//! use driftmark_protocol::StoreConfig;
//!
//! let db = ProvenanceDb::connect(&StoreConfig::from_env("DRIFTMARK_DB_URL")).await?;
//! db.record_event(&run_id, EventKind::BeforeNodeRun, "score_node", None).await;
//! ```

mod error;
mod hash;
mod schema;
mod types;

// Operations organized by domain
mod context;
mod events;
mod views;

pub use error::{DbError, Result};
pub use hash::short_hash;
pub use types::*;
pub use views::{ViewDef, ViewRegistry};

use driftmark_protocol::{FallbackPolicy, StoreConfig};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tracing::{error, info};

const MEMORY_URL: &str = "sqlite::memory:";

/// Handle to the provenance store.
///
/// Cloning is cheap (shared connection pool). Each unit of work acquires
/// its own transaction from the pool and releases it on every exit path;
/// a dropped transaction rolls back.
#[derive(Clone)]
pub struct ProvenanceDb {
    pool: SqlitePool,
}

impl ProvenanceDb {
    /// Connect using externally supplied credentials.
    ///
    /// When the URL is missing or the connection fails and the config
    /// allows it, falls back to an ephemeral in-memory store. The
    /// fallback is logged at error level, never silent.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        match &config.url {
            Some(url) => match Self::connect_url(url).await {
                Ok(db) => Ok(db),
                Err(err) => match config.fallback {
                    FallbackPolicy::InMemory => {
                        error!(%url, %err, "store connection failed, falling back to in-memory store");
                        Self::open_memory().await
                    }
                    FallbackPolicy::Strict => Err(err),
                },
            },
            None => match config.fallback {
                FallbackPolicy::InMemory => {
                    error!("store credentials unavailable, falling back to in-memory store");
                    Self::open_memory().await
                }
                FallbackPolicy::Strict => Err(DbError::Config(
                    "store credentials unavailable and fallback is disabled".into(),
                )),
            },
        }
    }

    /// Open or create a database file at the given path.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::connect_url(&format!("sqlite:{}?mode=rwc", path.display())).await
    }

    /// Open an ephemeral in-memory store.
    ///
    /// The pool is pinned to a single connection: every pooled connection
    /// to `sqlite::memory:` would otherwise see its own empty database.
    pub async fn open_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str(MEMORY_URL)?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    async fn connect_url(url: &str) -> Result<Self> {
        if url.contains(":memory:") {
            return Self::open_memory().await;
        }
        let options = SqliteConnectOptions::from_str(url)?
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        info!(%url, "provenance store opened");
        Ok(Self { pool })
    }

    /// Get the underlying connection pool (escape hatch for complex queries).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the store connection.
    pub async fn close(self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn open_creates_database_file() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("provenance.db");

        let db = ProvenanceDb::open(&db_path).await.unwrap();
        assert!(db_path.exists());
        db.close().await;
    }

    #[tokio::test]
    async fn connect_without_credentials_falls_back_to_memory() {
        let config = StoreConfig::default();
        let db = ProvenanceDb::connect(&config).await.unwrap();
        db.ensure_schema().await.unwrap();
        db.close().await;
    }

    #[tokio::test]
    async fn strict_config_rejects_missing_credentials() {
        let config = StoreConfig::default().strict();
        assert!(ProvenanceDb::connect(&config).await.is_err());
    }

    #[tokio::test]
    async fn connect_bad_url_falls_back_to_memory() {
        let config = StoreConfig::new("sqlite:/nonexistent-dir/x/y/z.db?mode=rw");
        let db = ProvenanceDb::connect(&config).await.unwrap();
        db.ensure_schema().await.unwrap();
        db.close().await;
    }
}
