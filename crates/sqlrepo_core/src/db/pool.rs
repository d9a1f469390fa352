//! Fixed-size SQLite connection pool.
//!
//! # Responsibility
//! - Open all connections eagerly at startup.
//! - Lend connections through RAII guards that return them on drop.
//! - Drain connections on explicit shutdown.
//!
//! # Invariants
//! - A lent connection is returned on every exit path of the borrower.
//! - After `close`, `get` fails with `DbError::PoolClosed` and returned
//!   connections are dropped instead of recycled.
//! - A `SharedMemory` pool holds exactly one connection. Shared-cache table
//!   locks fail with `SQLITE_LOCKED` and ignore the busy timeout, so two
//!   connections on one in-memory database cannot run concurrent callers.

use super::open::{open_connection, DatabaseTarget};
use super::{DbError, DbResult};
use crate::config::PoolConfig;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use log::{info, warn};
use rusqlite::Connection;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct PoolInner {
    idle_tx: Sender<Connection>,
    idle_rx: Receiver<Connection>,
    acquire_timeout: Duration,
    size: usize,
    target: DatabaseTarget,
    closed: AtomicBool,
}

/// Shared handle to a fixed set of SQLite connections.
///
/// Cloning is cheap; clones share the same connections.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Opens `config.max_connections` connections (at least one) for file
    /// targets, and a single connection for in-memory targets.
    ///
    /// # Errors
    /// - Returns the first connection open/configure failure.
    pub fn open(config: &PoolConfig) -> DbResult<Self> {
        let target = config.target();
        let size = match target {
            DatabaseTarget::File(_) => config.max_connections.max(1) as usize,
            DatabaseTarget::SharedMemory(_) => 1,
        };
        let busy_timeout = Duration::from_millis(config.busy_timeout_ms);
        let (idle_tx, idle_rx) = bounded(size);

        for _ in 0..size {
            let conn = open_connection(&target, busy_timeout)?;
            let _ = idle_tx.try_send(conn);
        }

        info!(
            "event=pool_open module=db status=ok size={size} requested={} acquire_timeout_ms={}",
            config.max_connections,
            config.acquire_timeout_ms
        );

        Ok(Self {
            inner: Arc::new(PoolInner {
                idle_tx,
                idle_rx,
                acquire_timeout: Duration::from_millis(config.acquire_timeout_ms),
                size,
                target,
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Borrows one connection, waiting up to the acquire timeout.
    ///
    /// # Errors
    /// - `PoolExhausted` when no connection frees up in time.
    /// - `PoolClosed` after `close`.
    pub fn get(&self) -> DbResult<PooledConnection> {
        if self.is_closed() {
            return Err(DbError::PoolClosed);
        }

        match self.inner.idle_rx.recv_timeout(self.inner.acquire_timeout) {
            Ok(conn) if self.is_closed() => {
                drop(conn);
                Err(DbError::PoolClosed)
            }
            Ok(conn) => Ok(PooledConnection {
                conn: Some(conn),
                pool: Arc::clone(&self.inner),
            }),
            Err(RecvTimeoutError::Timeout) => {
                let timeout_ms = self.inner.acquire_timeout.as_millis() as u64;
                warn!(
                    "event=pool_acquire module=db status=error error_code=pool_exhausted timeout_ms={timeout_ms} size={}",
                    self.inner.size
                );
                Err(DbError::PoolExhausted { timeout_ms })
            }
            Err(RecvTimeoutError::Disconnected) => Err(DbError::PoolClosed),
        }
    }

    /// Closes the pool and drops all idle connections.
    ///
    /// Connections currently lent out are dropped when their guard is.
    /// Idempotent.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let drained = self.inner.drain_idle();
        info!("event=pool_close module=db status=ok drained={drained}");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Total number of connections owned by the pool.
    pub fn size(&self) -> usize {
        self.inner.size
    }

    /// Connections currently idle.
    pub fn idle(&self) -> usize {
        self.inner.idle_rx.len()
    }

    pub fn target(&self) -> &DatabaseTarget {
        &self.inner.target
    }
}

impl PoolInner {
    fn drain_idle(&self) -> usize {
        let mut drained = 0usize;
        while let Ok(conn) = self.idle_rx.try_recv() {
            drop(conn);
            drained += 1;
        }
        drained
    }

    fn release(&self, conn: Connection) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        self.give_back(conn);
    }

    fn give_back(&self, conn: Connection) {
        // Capacity equals pool size, so a returned connection always fits.
        let _ = self.idle_tx.try_send(conn);
        // A `close` that ran after the caller's check has already drained.
        if self.closed.load(Ordering::SeqCst) {
            self.drain_idle();
        }
    }
}

/// Connection on loan from a `ConnectionPool`.
pub struct PooledConnection {
    conn: Option<Connection>,
    pool: Arc<PoolInner>,
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn
            .as_ref()
            .expect("pooled connection is present until drop")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn
            .as_mut()
            .expect("pooled connection is present until drop")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}
