//! Event store trait
//!
//! Defines the interface the ingestion and dashboard paths use to reach the
//! append-only event log. The handle is always passed explicitly.

use super::event::Event;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[derive(Debug)]
pub enum StoreError {
    /// Pool or query exceeded its deadline; names the stage
    Timeout(&'static str),
    Pool(String),
    Database(rusqlite::Error),
    Interact(String),
    Io(std::io::Error),
}

impl StoreError {
    /// Failures worth another attempt: deadlines and SQLite lock contention.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Timeout(_) => true,
            StoreError::Database(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }

    /// The statement was abandoned mid-flight and may still have committed.
    pub fn is_query_timeout(&self) -> bool {
        matches!(self, StoreError::Timeout("query"))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(err)
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err)
    }
}

impl From<deadpool_sqlite::PoolError> for StoreError {
    fn from(err: deadpool_sqlite::PoolError) -> Self {
        match err {
            deadpool_sqlite::PoolError::Timeout(_) => StoreError::Timeout("acquire"),
            deadpool_sqlite::PoolError::Backend(e) => StoreError::Database(e),
            other => StoreError::Pool(other.to_string()),
        }
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Timeout(stage) => write!(f, "Store timeout during {}", stage),
            StoreError::Pool(e) => write!(f, "Connection pool error: {}", e),
            StoreError::Database(e) => write!(f, "Database error: {}", e),
            StoreError::Interact(e) => write!(f, "Connection task failed: {}", e),
            StoreError::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

/// Half-open `[since, until)` bound on event timestamps; `None` is unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.since.map_or(true, |since| ts >= since) && self.until.map_or(true, |until| ts < until)
    }
}

/// Backend trait for the append-only event log
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append a single event; returns its storage id
    async fn append(&self, event: &Event) -> Result<i64, StoreError>;

    /// Read every stored event inside `range`, in insertion order
    async fn snapshot(&self, range: TimeRange) -> Result<Vec<Event>, StoreError>;

    /// Get backend type for logging
    fn backend_type(&self) -> &'static str;
}
