//! Store and sink configuration.
//!
//! The host process constructs these once and passes them into every
//! component that needs store access. There is no ambient global engine.

/// Behavior when the store URL is missing or the connection fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackPolicy {
    /// Fall back to an ephemeral in-memory store. The fallback is logged
    /// at error level so a misconfigured deployment is visible.
    #[default]
    InMemory,
    /// Treat a missing URL or failed connection as a hard error.
    Strict,
}

/// Connection configuration for the provenance store.
#[derive(Debug, Clone, Default)]
pub struct StoreConfig {
    /// Store URL from externally supplied credentials
    /// (`sqlite:/path/to.db` or `sqlite::memory:`).
    pub url: Option<String>,
    pub fallback: FallbackPolicy,
}

impl StoreConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            fallback: FallbackPolicy::default(),
        }
    }

    /// Read the URL from an environment variable, typically populated by
    /// the host's credential loader.
    pub fn from_env(var: &str) -> Self {
        Self {
            url: std::env::var(var).ok(),
            fallback: FallbackPolicy::default(),
        }
    }

    pub fn strict(mut self) -> Self {
        self.fallback = FallbackPolicy::Strict;
        self
    }
}

/// Insertion strategy for persisting a score batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteStrategy {
    /// Row-oriented appends: prepared statements in per-chunk
    /// transactions. A failure propagates to the caller and leaves the
    /// already-committed prefix in place.
    #[default]
    RowAppend,
    /// High-throughput streaming: each chunk is serialized to an
    /// in-memory delimited buffer and loaded in a single transaction.
    /// A chunk failure terminates the process.
    BulkStream,
}

/// Configuration for the score sink.
#[derive(Debug, Clone)]
pub struct SinkConfig {
    pub strategy: WriteStrategy,
    /// Rows per chunk/statement batch.
    pub chunk_size: usize,
    /// Reproduce the historical partitioning scheme, which leaves a
    /// trailing partial chunk unwritten when the batch size is not a
    /// multiple of `chunk_size`. Only for byte-compatible replays.
    pub legacy_partitioning: bool,
}

pub const DEFAULT_CHUNK_SIZE: usize = 10_000;

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            strategy: WriteStrategy::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            legacy_partitioning: false,
        }
    }
}

impl SinkConfig {
    pub fn with_strategy(strategy: WriteStrategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }
}
