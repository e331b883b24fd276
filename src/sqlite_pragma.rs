//! Connection tuning shared by every SQLite handle the service opens.

use rusqlite::Connection;
use std::time::Duration;

/// Busy timeout applied to each pooled connection.
pub const BUSY_TIMEOUT: Duration = Duration::from_millis(2_000);

/// Apply the database-wide PRAGMAs (WAL, NORMAL sync, in-memory temp store,
/// page cache, autocheckpoint) plus the per-connection busy timeout.
///
/// `journal_mode` persists in the database file; the rest is per connection
/// and has to be re-applied on every fresh handle.
pub fn apply_optimized_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    apply_connection_pragmas(conn)
}

/// Per-connection subset of [`apply_optimized_pragmas`].
pub fn apply_connection_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    conn.pragma_update(None, "cache_size", -16_000)?;
    conn.pragma_update(None, "wal_autocheckpoint", 1_000)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_wal_and_checkpoint_configured() {
        let dir = tempdir().unwrap();
        let conn = Connection::open(dir.path().join("pragma.db")).unwrap();

        apply_optimized_pragmas(&conn).unwrap();

        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(journal_mode.to_lowercase(), "wal");

        let checkpoint: i32 = conn
            .query_row("PRAGMA wal_autocheckpoint", [], |row| row.get(0))
            .unwrap();
        assert_eq!(checkpoint, 1000);
    }
}
