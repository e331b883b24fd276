//! SQLite-backed event store with a bounded connection pool
//!
//! Connections are checked out per operation and returned when the pooled
//! object drops, so no handle outlives the request that acquired it. Every
//! operation runs under the configured query timeout and transient failures
//! are retried with backoff before surfacing.

use super::event::{Event, EventPayload};
use super::store::{EventStore, StoreError, TimeRange};
use crate::config::StoreConfig;
use crate::retry::ExponentialBackoff;
use crate::sqlite_pragma::{apply_connection_pragmas, apply_optimized_pragmas};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use deadpool_sqlite::{Pool, Runtime};
use rusqlite::{params, Connection};
use std::path::Path;

/// Schema files, applied in order. All statements are `IF NOT EXISTS`.
const SCHEMA: [(&str, &str); 2] = [
    ("01_events.sql", include_str!("../../sql/01_events.sql")),
    ("02_registrations.sql", include_str!("../../sql/02_registrations.sql")),
];

/// Run the embedded schema migrations on `conn`.
pub fn run_schema_migrations(conn: &Connection) -> rusqlite::Result<()> {
    log::info!("🔧 Running schema migrations");
    for (name, sql) in SCHEMA {
        conn.execute_batch(sql)?;
        log::info!("   ├─ ✅ {}", name);
    }
    Ok(())
}

pub struct SqliteStore {
    pool: Pool,
    config: StoreConfig,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `config.db_path`, apply
    /// PRAGMAs and schema, then build the connection pool.
    pub async fn open(config: StoreConfig) -> Result<Self, StoreError> {
        if let Some(parent) = Path::new(&config.db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let path = config.db_path.clone();
        tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            let conn = Connection::open(&path)?;
            apply_optimized_pragmas(&conn)?;
            run_schema_migrations(&conn)?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Interact(e.to_string()))??;

        let pool = deadpool_sqlite::Config::new(&config.db_path)
            .builder(Runtime::Tokio1)
            .map_err(|e| StoreError::Pool(e.to_string()))?
            .max_size(config.pool_size)
            .wait_timeout(Some(config.acquire_timeout))
            .create_timeout(Some(config.acquire_timeout))
            .build()
            .map_err(|e| StoreError::Pool(e.to_string()))?;

        log::info!(
            "✅ SQLite store ready: {} (pool size {}, query timeout {}ms)",
            config.db_path,
            config.pool_size,
            config.query_timeout.as_millis()
        );

        Ok(Self { pool, config })
    }

    /// Run `f` on a pooled connection, retrying transient failures.
    ///
    /// `f` may run more than once, so it must not consume its captures and
    /// must be safe to repeat. Inserts go through [`SqliteStore::with_write`].
    pub async fn with_connection<F, T>(&self, op: &'static str, f: F) -> Result<T, StoreError>
    where
        F: Fn(&mut Connection) -> Result<T, StoreError> + Clone + Send + 'static,
        T: Send + 'static,
    {
        self.run_with_retry(op, true, f).await
    }

    /// Like [`SqliteStore::with_connection`] for statements that must not be
    /// applied twice.
    ///
    /// A query timeout only abandons the wait; the statement keeps running on
    /// its blocking thread and may still commit, so it is never retried.
    /// Acquire timeouts and SQLITE_BUSY/LOCKED mean nothing ran and are.
    pub async fn with_write<F, T>(&self, op: &'static str, f: F) -> Result<T, StoreError>
    where
        F: Fn(&mut Connection) -> Result<T, StoreError> + Clone + Send + 'static,
        T: Send + 'static,
    {
        self.run_with_retry(op, false, f).await
    }

    async fn run_with_retry<F, T>(&self, op: &'static str, repeatable: bool, f: F) -> Result<T, StoreError>
    where
        F: Fn(&mut Connection) -> Result<T, StoreError> + Clone + Send + 'static,
        T: Send + 'static,
    {
        let mut backoff = ExponentialBackoff::new(
            self.config.retry_base_delay,
            self.config.retry_max_delay,
            self.config.max_retries,
        );

        loop {
            match self.run_once(f.clone()).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && (repeatable || !e.is_query_timeout()) => {
                    log::warn!("⚠️  {} failed: {}", op, e);
                    if backoff.sleep().await.is_err() {
                        log::error!("❌ {} gave up after {} retries", op, backoff.attempts());
                        return Err(e);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn run_once<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.pool.get().await?;
        let work = conn.interact(move |conn| {
            apply_connection_pragmas(conn)?;
            f(conn)
        });

        match tokio::time::timeout(self.config.query_timeout, work).await {
            Err(_) => Err(StoreError::Timeout("query")),
            Ok(Err(e)) => Err(StoreError::Interact(e.to_string())),
            Ok(Ok(result)) => result,
        }
    }

    pub fn db_path(&self) -> &str {
        &self.config.db_path
    }
}

#[async_trait]
impl EventStore for SqliteStore {
    async fn append(&self, event: &Event) -> Result<i64, StoreError> {
        let event_type = event.event_type().to_string();
        let user_id = event.user_id.clone();
        let session_id = event.session_id.clone();
        let timestamp_ms = event.timestamp.timestamp_millis();
        let event_data = event
            .payload
            .to_data()
            .map(|v| v.to_string())
            .map_err(|e| StoreError::Interact(format!("event_data serialization: {}", e)))?;

        let id = self
            .with_write("append event", move |conn| {
                conn.execute(
                    "INSERT INTO events
                     (event_type, user_id, session_id, timestamp_ms, event_data, received_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        event_type,
                        user_id,
                        session_id,
                        timestamp_ms,
                        event_data,
                        Utc::now().timestamp_millis(),
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;

        log::debug!("📥 Stored {} event id={}", event.event_type(), id);
        Ok(id)
    }

    async fn snapshot(&self, range: TimeRange) -> Result<Vec<Event>, StoreError> {
        let since = range.since.map(|t| t.timestamp_millis());
        let until = range.until.map(|t| t.timestamp_millis());

        let rows = self
            .with_connection("read events", move |conn| {
                let mut stmt = conn.prepare_cached(
                    "SELECT event_type, user_id, session_id, timestamp_ms, event_data
                     FROM events
                     WHERE (?1 IS NULL OR timestamp_ms >= ?1)
                       AND (?2 IS NULL OR timestamp_ms < ?2)
                     ORDER BY id ASC",
                )?;
                let rows = stmt
                    .query_map(params![since, until], |row| {
                        Ok(StoredRow {
                            event_type: row.get(0)?,
                            user_id: row.get(1)?,
                            session_id: row.get(2)?,
                            timestamp_ms: row.get(3)?,
                            event_data: row.get(4)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        let total = rows.len();
        let events: Vec<Event> = rows.into_iter().filter_map(StoredRow::into_event).collect();
        if events.len() < total {
            log::warn!(
                "⚠️  Skipped {} undecodable event rows out of {}",
                total - events.len(),
                total
            );
        }

        Ok(events)
    }

    fn backend_type(&self) -> &'static str {
        "SQLite"
    }
}

struct StoredRow {
    event_type: String,
    user_id: String,
    session_id: String,
    timestamp_ms: i64,
    event_data: String,
}

impl StoredRow {
    fn into_event(self) -> Option<Event> {
        let timestamp = Utc.timestamp_millis_opt(self.timestamp_ms).single()?;
        let data = match serde_json::from_str(&self.event_data) {
            Ok(v) => v,
            Err(e) => {
                log::debug!("Bad event_data JSON for {}: {}", self.event_type, e);
                return None;
            }
        };
        let payload = match EventPayload::from_parts(&self.event_type, data) {
            Ok(p) => p,
            Err(e) => {
                log::debug!("Bad event_data for {}: {}", self.event_type, e);
                return None;
            }
        };

        Some(Event {
            user_id: self.user_id,
            session_id: self.session_id,
            timestamp,
            payload,
        })
    }
}
