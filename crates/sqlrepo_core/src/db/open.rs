//! Connection bootstrap utilities for SQLite.
//!
//! # Responsibility
//! - Open file or shared in-memory SQLite connections.
//! - Configure connection pragmas required by repository behavior.
//!
//! # Invariants
//! - Returned connections have `foreign_keys=ON`.
//! - File databases run in WAL mode so readers do not block the writer.
//! - All connections opened for one `SharedMemory` name see the same data.

use super::DbResult;
use log::{error, info};
use rusqlite::{Connection, OpenFlags};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Where pooled connections point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseTarget {
    /// On-disk database file.
    File(PathBuf),
    /// Named in-memory database shared by every connection of the pool.
    ///
    /// The database lives as long as at least one connection is open.
    SharedMemory(String),
}

impl DatabaseTarget {
    /// Fresh, process-unique in-memory database.
    pub fn unique_memory() -> Self {
        Self::SharedMemory(format!("sqlrepo-{}", Uuid::new_v4().simple()))
    }

    fn mode(&self) -> &'static str {
        match self {
            Self::File(_) => "file",
            Self::SharedMemory(_) => "memory",
        }
    }
}

/// Opens and configures one connection for `target`.
///
/// # Side effects
/// - Emits `db_open` logging events with duration and status.
pub fn open_connection(target: &DatabaseTarget, busy_timeout: Duration) -> DbResult<Connection> {
    let started_at = Instant::now();
    let mode = target.mode();

    let opened = match target {
        DatabaseTarget::File(path) => Connection::open(path),
        DatabaseTarget::SharedMemory(name) => Connection::open_with_flags(
            format!("file:{name}?mode=memory&cache=shared"),
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        ),
    };
    let conn = match opened {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={mode} duration_ms={} error_code=db_open_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    match configure_connection(&conn, target, busy_timeout) {
        Ok(()) => {
            info!(
                "event=db_open module=db status=ok mode={mode} duration_ms={}",
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={mode} duration_ms={} error_code=db_configure_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            Err(err.into())
        }
    }
}

fn configure_connection(
    conn: &Connection,
    target: &DatabaseTarget,
    busy_timeout: Duration,
) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(busy_timeout)?;
    if let DatabaseTarget::File(_) = target {
        conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get::<_, String>(0))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{open_connection, DatabaseTarget};
    use std::time::Duration;

    #[test]
    fn shared_memory_connections_see_same_data() {
        let target = DatabaseTarget::unique_memory();
        let first = open_connection(&target, Duration::from_secs(1)).unwrap();
        let second = open_connection(&target, Duration::from_secs(1)).unwrap();

        first
            .execute_batch("CREATE TABLE t (v INTEGER); INSERT INTO t VALUES (42);")
            .unwrap();
        let value: i64 = second
            .query_row("SELECT v FROM t", [], |row| row.get(0))
            .unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn foreign_keys_are_enforced() {
        let conn = open_connection(&DatabaseTarget::unique_memory(), Duration::from_secs(1))
            .unwrap();
        let enabled: i64 = conn
            .query_row("PRAGMA foreign_keys;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(enabled, 1);
    }

    #[test]
    fn file_target_uses_wal() {
        let dir = tempfile::tempdir().unwrap();
        let target = DatabaseTarget::File(dir.path().join("wal.db"));
        let conn = open_connection(&target, Duration::from_secs(1)).unwrap();
        let mode: String = conn
            .query_row("PRAGMA journal_mode;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_ascii_lowercase(), "wal");
    }
}
