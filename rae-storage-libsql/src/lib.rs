#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]

//! # RAE Storage — libSQL
//!
//! libSQL/Turso backend for the RAE memory engine. One [`LibsqlStorage`]
//! instance implements every repository trait plus the vector index, so a
//! single database file (or remote Turso instance) backs memories, the
//! knowledge graph, cost governance, and embeddings.
//!
//! This crate provides:
//! - Connection management and schema creation
//! - `MemoryRepository`, `GraphRepository`, `CostRepository`,
//!   `BudgetRepository`, and `VectorIndex` implementations
//! - FTS5-backed full-text search over memory content
//! - Retry with exponential backoff for transient read failures
//!
//! ## Example
//!
//! ```no_run
//! use rae_storage_libsql::LibsqlStorage;
//!
//! # async fn example() -> rae_core::Result<()> {
//! let storage = LibsqlStorage::open("file:rae.db").await?;
//! storage.initialize_schema().await?;
//! # Ok(())
//! # }
//! ```

mod cost;
mod graph;
mod memories;
mod schema;
mod vector;

pub use schema::ALL_STATEMENTS;

use chrono::{DateTime, Utc};
use libsql::{Builder, Connection, Database};
use rae_core::error::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Configuration for the libSQL backend.
#[derive(Debug, Clone)]
pub struct LibsqlConfig {
    /// Maximum retry attempts for transient read failures
    pub max_read_retries: u32,
    /// Base delay for exponential backoff
    pub retry_base_delay: Duration,
    /// Ceiling for the backoff delay
    pub retry_max_delay: Duration,
}

impl Default for LibsqlConfig {
    fn default() -> Self {
        Self {
            max_read_retries: 3,
            retry_base_delay: Duration::from_millis(100),
            retry_max_delay: Duration::from_secs(5),
        }
    }
}

/// libSQL storage backend implementing the engine's repository traits.
pub struct LibsqlStorage {
    db: Arc<Database>,
    config: LibsqlConfig,
}

impl LibsqlStorage {
    /// Open a local database (`file:...` or `:memory:`).
    pub async fn open(path: &str) -> Result<Self> {
        let db = Builder::new_local(path)
            .build()
            .await
            .map_err(|e| storage_error("open database", &e))?;
        Ok(Self::from_database(db))
    }

    /// Connect to a remote Turso database.
    pub async fn open_remote(url: &str, token: &str) -> Result<Self> {
        let db = Builder::new_remote(url.to_string(), token.to_string())
            .build()
            .await
            .map_err(|e| storage_error("open remote database", &e))?;
        Ok(Self::from_database(db))
    }

    /// Wrap an existing database handle.
    #[must_use]
    pub fn from_database(db: Database) -> Self {
        Self {
            db: Arc::new(db),
            config: LibsqlConfig::default(),
        }
    }

    /// Replace the retry configuration.
    #[must_use]
    pub fn with_config(mut self, config: LibsqlConfig) -> Self {
        self.config = config;
        self
    }

    /// Create tables, indices, and the FTS machinery. Idempotent.
    pub async fn initialize_schema(&self) -> Result<()> {
        let conn = self.connection().await?;
        for statement in schema::ALL_STATEMENTS {
            conn.execute(statement, ())
                .await
                .map_err(|e| storage_error("create schema", &e))?;
        }
        info!("libsql schema initialized");
        Ok(())
    }

    /// Open a connection with the write-friendly pragmas applied.
    pub(crate) async fn connection(&self) -> Result<Connection> {
        let conn = self
            .db
            .connect()
            .map_err(|e| storage_error("connect", &e))?;
        // WAL keeps readers unblocked by writers; the busy timeout makes
        // concurrent writers queue instead of failing fast.
        if let Ok(mut rows) = conn.query("PRAGMA journal_mode=WAL", ()).await {
            let _ = rows.next().await;
        }
        if let Ok(mut rows) = conn.query("PRAGMA busy_timeout=30000", ()).await {
            let _ = rows.next().await;
        }
        Ok(conn)
    }

    /// Run a read closure with exponential backoff on transient failures.
    pub(crate) async fn with_read_retry<T, F, Fut>(&self, operation: &str, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.config.max_read_retries => {
                    let delay = self
                        .config
                        .retry_base_delay
                        .saturating_mul(2u32.saturating_pow(attempt))
                        .min(self.config.retry_max_delay);
                    warn!(operation, attempt, ?delay, "transient read failure, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Cheap connectivity check shared by the repository probes.
    pub(crate) async fn probe_connection(&self) -> Result<()> {
        let conn = self.connection().await?;
        conn.query("SELECT 1", ())
            .await
            .map_err(|e| storage_error("probe", &e))?;
        debug!("storage probe ok");
        Ok(())
    }
}

/// Map a libsql error into the engine's classified storage error.
///
/// Classification looks at the backend's message only, never the caller
/// context.
pub(crate) fn storage_error(context: &str, err: &libsql::Error) -> Error {
    let lowered = err.to_string().to_lowercase();
    let transient = ["locked", "busy", "timeout", "timed out", "connection", "network"]
        .iter()
        .any(|needle| lowered.contains(needle));
    Error::Storage {
        message: format!("{context}: {err}"),
        transient,
    }
}

/// Timestamp encoding: microseconds since the Unix epoch.
pub(crate) fn ts_micros(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_micros()
}

/// Decode a microsecond timestamp, clamping garbage to the epoch.
pub(crate) fn dt_from_micros(micros: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(micros).unwrap_or(DateTime::UNIX_EPOCH)
}

/// Parse a JSON text column into a list of strings.
pub(crate) fn parse_string_list(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_round_trip() {
        let now = Utc::now();
        let decoded = dt_from_micros(ts_micros(now));
        assert_eq!(decoded.timestamp_micros(), now.timestamp_micros());
    }

    #[test]
    fn test_error_classification() {
        let err = Error::Storage {
            message: "x: database is locked".to_string(),
            transient: true,
        };
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_schema_initializes_in_memory() {
        let storage = LibsqlStorage::open(":memory:").await.unwrap();
        storage.initialize_schema().await.unwrap();
        storage.probe_connection().await.unwrap();
        // Second run must be a no-op.
        storage.initialize_schema().await.unwrap();
    }
}
