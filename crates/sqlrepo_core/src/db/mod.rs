//! SQLite connection bootstrap, pooling and statement execution.
//!
//! # Responsibility
//! - Open and configure SQLite connections for repositories.
//! - Hand out pooled connections with guaranteed release.
//! - Execute built statements and detach result rows.
//!
//! # Invariants
//! - Every pooled connection has `foreign_keys=ON` and a busy timeout.
//! - No connection is shared by two callers at the same time.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod exec;
mod open;
pub mod pool;

pub use open::{open_connection, DatabaseTarget};
pub use pool::{ConnectionPool, PooledConnection};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// No idle connection became available within the acquire timeout.
    PoolExhausted {
        timeout_ms: u64,
    },
    /// The pool was closed.
    PoolClosed,
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::PoolExhausted { timeout_ms } => write!(
                f,
                "no pooled connection available after {timeout_ms} ms"
            ),
            Self::PoolClosed => write!(f, "connection pool is closed"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::PoolExhausted { .. } => None,
            Self::PoolClosed => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
