//! Bounded SQLite connection pool.
//!
//! All `pool_size` connections are opened once at construction and reused for
//! the pool's lifetime. `acquire` blocks the caller on a condvar until a
//! connection is returned or the timeout elapses; the returned guard puts the
//! connection back on every exit path, success or error alike.
//!
//! The pool does not enforce a write mutex: WAL mode allows unlimited
//! concurrent readers with exactly one writer at a time, so concurrent
//! writers serialize at the engine level via `busy_timeout`.

use crate::core::db;
use crate::core::error::MemoryError;
use rusqlite::Connection;
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

pub struct ConnectionPool {
    idle: Mutex<Vec<Connection>>,
    available: Condvar,
    size: usize,
}

impl ConnectionPool {
    /// Open `size` connections up front. A zero size is clamped to one.
    pub fn open(db_path: &Path, size: usize) -> Result<Self, MemoryError> {
        let size = size.max(1);
        let mut idle = Vec::with_capacity(size);
        for _ in 0..size {
            idle.push(db::db_connect(db_path)?);
        }
        tracing::debug!(size, "connection pool opened");
        Ok(Self {
            idle: Mutex::new(idle),
            available: Condvar::new(),
            size,
        })
    }

    /// Block until a connection is free or `timeout` elapses. A timed-out
    /// acquire has performed no engine work and is always safe to retry.
    pub fn acquire(&self, timeout: Duration) -> Result<PooledConnection<'_>, MemoryError> {
        let deadline = Instant::now() + timeout;
        let mut idle = self
            .idle
            .lock()
            .map_err(|_| MemoryError::StorageError("connection pool lock poisoned".to_string()))?;

        loop {
            if let Some(conn) = idle.pop() {
                return Ok(PooledConnection {
                    pool: self,
                    conn: Some(conn),
                });
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(MemoryError::PoolTimeout(timeout));
            }
            let (guard, wait) = self
                .available
                .wait_timeout(idle, remaining)
                .map_err(|_| MemoryError::StorageError("connection pool lock poisoned".to_string()))?;
            idle = guard;
            if wait.timed_out() && idle.is_empty() {
                return Err(MemoryError::PoolTimeout(timeout));
            }
        }
    }

    /// Number of currently idle connections. Health reporting only.
    pub fn idle_count(&self) -> usize {
        self.idle.lock().map(|idle| idle.len()).unwrap_or(0)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    fn release(&self, conn: Connection) {
        if let Ok(mut idle) = self.idle.lock() {
            idle.push(conn);
        }
        self.available.notify_one();
    }
}

/// RAII guard for a pooled connection. Dropping it returns the connection.
pub struct PooledConnection<'a> {
    pool: &'a ConnectionPool,
    conn: Option<Connection>,
}

impl Deref for PooledConnection<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        // Only None after drop has taken it.
        self.conn.as_ref().expect("pooled connection already released")
    }
}

impl DerefMut for PooledConnection<'_> {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("pooled connection already released")
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_pool(size: usize) -> (tempfile::TempDir, ConnectionPool) {
        let tmp = tempdir().unwrap();
        let pool = ConnectionPool::open(&tmp.path().join("pool.db"), size).unwrap();
        (tmp, pool)
    }

    #[test]
    fn test_acquire_up_to_size() {
        let (_tmp, pool) = test_pool(2);
        let a = pool.acquire(Duration::from_millis(50)).unwrap();
        let b = pool.acquire(Duration::from_millis(50)).unwrap();
        assert_eq!(pool.idle_count(), 0);
        drop(a);
        drop(b);
        assert_eq!(pool.idle_count(), 2);
    }

    #[test]
    fn test_exhausted_pool_times_out() {
        let (_tmp, pool) = test_pool(1);
        let _held = pool.acquire(Duration::from_millis(50)).unwrap();
        assert!(matches!(
            pool.acquire(Duration::from_millis(50)),
            Err(MemoryError::PoolTimeout(_))
        ));
    }

    #[test]
    fn test_release_unblocks_reacquire() {
        let (_tmp, pool) = test_pool(1);
        let held = pool.acquire(Duration::from_millis(50)).unwrap();
        drop(held);
        // Connection came back; acquire succeeds immediately.
        let again = pool.acquire(Duration::from_millis(50)).unwrap();
        drop(again);
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn test_guard_returns_connection_on_error_path() {
        let (_tmp, pool) = test_pool(1);
        let result: Result<(), MemoryError> = (|| {
            let conn = pool.acquire(Duration::from_millis(50))?;
            conn.execute("THIS IS NOT SQL", [])?;
            Ok(())
        })();
        assert!(result.is_err());
        assert_eq!(pool.idle_count(), 1);
    }
}
