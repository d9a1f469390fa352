//! Statement execution primitives over one borrowed connection.
//!
//! Rows are detached into `RowData` before the statement is finalized, so no
//! result borrows the connection after these functions return.

use super::{DbError, DbResult};
use crate::sql::builder::SqlStatement;
use crate::sql::row::RowData;
use rusqlite::types::Value;
use log::warn;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use std::sync::Arc;

const SAVEPOINT: &str = "sqlrepo_write";

/// Runs a write statement and returns the affected row count.
pub fn execute(conn: &Connection, statement: &SqlStatement) -> DbResult<usize> {
    let changed = conn.execute(&statement.sql, params_from_iter(statement.binds.iter()))?;
    Ok(changed)
}

/// Runs a read statement and collects every row.
pub fn query(conn: &Connection, statement: &SqlStatement) -> DbResult<Vec<RowData>> {
    let mut stmt = conn.prepare(&statement.sql)?;
    let columns: Arc<[String]> = stmt
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect();

    let mut rows = stmt.query(params_from_iter(statement.binds.iter()))?;
    let mut collected = Vec::new();
    while let Some(row) = rows.next()? {
        let values = (0..columns.len())
            .map(|index| row.get::<_, Value>(index))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        collected.push(RowData::new(Arc::clone(&columns), values));
    }

    Ok(collected)
}

/// Runs a single-integer query such as `COUNT(*)`.
pub fn query_count(conn: &Connection, statement: &SqlStatement) -> DbResult<u64> {
    let count = conn.query_row(
        &statement.sql,
        params_from_iter(statement.binds.iter()),
        |row| row.get::<_, i64>(0),
    )?;
    Ok(u64::try_from(count).unwrap_or(0))
}

/// Returns whether the statement yields at least one row.
pub fn query_exists(conn: &Connection, statement: &SqlStatement) -> DbResult<bool> {
    let mut stmt = conn.prepare(&statement.sql)?;
    let exists = stmt.exists(params_from_iter(statement.binds.iter()))?;
    Ok(exists)
}

/// Runs an `INSERT ... RETURNING <id>` and returns the key.
///
/// Insert and key retrieval are one statement, so they share one implicit
/// unit of work. `None` means the database returned no row.
pub fn insert_returning_key(conn: &Connection, statement: &SqlStatement) -> DbResult<Option<Value>> {
    let key = conn
        .query_row(
            &statement.sql,
            params_from_iter(statement.binds.iter()),
            |row| row.get::<_, Value>(0),
        )
        .optional()?;
    Ok(key)
}

/// Runs `work` inside a savepoint and undoes its writes when it fails.
///
/// Nests inside an open transaction; outside one it commits on success.
pub fn in_savepoint<T, E>(
    conn: &Connection,
    work: impl FnOnce(&Connection) -> Result<T, E>,
) -> Result<T, E>
where
    E: From<DbError>,
{
    conn.execute_batch(&format!("SAVEPOINT {SAVEPOINT}"))
        .map_err(DbError::from)?;
    match work(conn) {
        Ok(value) => {
            conn.execute_batch(&format!("RELEASE {SAVEPOINT}"))
                .map_err(DbError::from)?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback) =
                conn.execute_batch(&format!("ROLLBACK TO {SAVEPOINT}; RELEASE {SAVEPOINT}"))
            {
                warn!(
                    "event=savepoint_rollback module=db status=error error={rollback}"
                );
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{execute, in_savepoint, insert_returning_key, query, query_count, query_exists};
    use crate::db::DbError;
    use crate::sql::builder::SqlStatement;
    use rusqlite::types::Value;
    use rusqlite::Connection;

    fn statement(sql: &str, binds: Vec<Value>) -> SqlStatement {
        SqlStatement {
            sql: sql.to_string(),
            binds,
        }
    }

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY AUTOINCREMENT, v TEXT);")
            .unwrap();
        conn
    }

    #[test]
    fn insert_returns_generated_key_and_rows_round_trip() {
        let conn = setup();
        let key = insert_returning_key(
            &conn,
            &statement(
                "INSERT INTO t (v) VALUES (?1) RETURNING id",
                vec![Value::Text("a".into())],
            ),
        )
        .unwrap();
        assert_eq!(key, Some(Value::Integer(1)));

        let rows = query(
            &conn,
            &statement("SELECT id, v AS \"x.v\" FROM t WHERE id = ?1", vec![Value::Integer(1)]),
        )
        .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value("x.v"), Some(&Value::Text("a".into())));
    }

    #[test]
    fn count_exists_and_execute() {
        let conn = setup();
        conn.execute_batch("INSERT INTO t (v) VALUES ('a'), ('b');")
            .unwrap();

        assert_eq!(query_count(&conn, &statement("SELECT COUNT(*) FROM t", vec![])).unwrap(), 2);
        assert!(query_exists(
            &conn,
            &statement("SELECT 1 FROM t WHERE id = ?1 LIMIT 1", vec![Value::Integer(2)])
        )
        .unwrap());

        let changed = execute(&conn, &statement("DELETE FROM t", vec![])).unwrap();
        assert_eq!(changed, 2);
        assert!(!query_exists(
            &conn,
            &statement("SELECT 1 FROM t WHERE id = ?1 LIMIT 1", vec![Value::Integer(2)])
        )
        .unwrap());
    }

    #[test]
    fn savepoint_keeps_writes_on_success_and_undoes_them_on_failure() {
        let conn = setup();
        let count = statement("SELECT COUNT(*) FROM t", vec![]);

        let kept: Result<usize, DbError> = in_savepoint(&conn, |conn| {
            Ok(execute(conn, &statement("INSERT INTO t (v) VALUES ('kept')", vec![]))?)
        });
        assert_eq!(kept.unwrap(), 1);

        let undone: Result<(), DbError> = in_savepoint(&conn, |conn| {
            execute(conn, &statement("INSERT INTO t (v) VALUES ('undone')", vec![]))?;
            Err(DbError::PoolClosed)
        });
        assert!(matches!(undone, Err(DbError::PoolClosed)));
        assert_eq!(query_count(&conn, &count).unwrap(), 1);
    }

    #[test]
    fn savepoint_nests_inside_transaction() {
        let mut conn = setup();
        let tx = conn.transaction().unwrap();
        let undone: Result<(), DbError> = in_savepoint(&tx, |conn| {
            execute(conn, &statement("INSERT INTO t (v) VALUES ('undone')", vec![]))?;
            Err(DbError::PoolClosed)
        });
        assert!(undone.is_err());
        execute(&tx, &statement("INSERT INTO t (v) VALUES ('kept')", vec![])).unwrap();
        tx.commit().unwrap();

        let count = statement("SELECT COUNT(*) FROM t", vec![]);
        assert_eq!(query_count(&conn, &count).unwrap(), 1);
    }
}
