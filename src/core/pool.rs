//! SQLite connection pool with read/write separation and retry logic.
//!
//! - Maintains a **write mutex** per DB for serialized write access
//! - Every write runs inside an `IMMEDIATE` transaction: commit on `Ok`, rollback on `Err`
//! - Creates fresh **read connections** per operation (no mutex, concurrent via WAL)
//! - Busy/locked write failures are retried with exponential backoff
//!
//! Connections are opened fresh each time rather than cached, so a pool entry is
//! only a lock plus a path.

use crate::core::db;
use crate::core::error::ThreadError;
use rusqlite::{Connection, TransactionBehavior};
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::thread;
use std::time::Duration;

/// Maximum retry attempts for busy/locked errors.
const MAX_RETRIES: u32 = 5;
/// Base delay for exponential backoff (milliseconds).
const BASE_DELAY_MS: u64 = 50;
/// Maximum delay cap (milliseconds).
const MAX_DELAY_MS: u64 = 2_000;

const WRITE_BUSY_TIMEOUT_SECS: u32 = 30;
const READ_BUSY_TIMEOUT_SECS: u32 = 15;

struct PoolEntry {
    write_lock: Mutex<()>,
    db_path: PathBuf,
}

pub struct SqlitePool {
    entries: Mutex<FxHashMap<PathBuf, &'static PoolEntry>>,
}

impl SqlitePool {
    fn new() -> Self {
        Self {
            entries: Mutex::new(FxHashMap::default()),
        }
    }

    fn get_entry(&self, db_path: &Path) -> Result<&'static PoolEntry, ThreadError> {
        let key = db_path.to_path_buf();
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| ThreadError::Validation("SqlitePool entries lock poisoned".to_string()))?;
        if let Some(entry) = entries.get(&key) {
            return Ok(*entry);
        }
        let entry = Box::leak(Box::new(PoolEntry {
            write_lock: Mutex::new(()),
            db_path: key.clone(),
        }));
        entries.insert(key, entry);
        Ok(entry)
    }

    /// Run `f` inside a write transaction on `db_path`.
    ///
    /// Writers to the same database are serialized in-process; cross-process
    /// contention is absorbed by the busy timeout plus bounded retries. The
    /// closure may run more than once when the database reports busy.
    pub fn with_write<F, R>(&self, db_path: &Path, mut f: F) -> Result<R, ThreadError>
    where
        F: FnMut(&Connection) -> Result<R, ThreadError>,
    {
        let entry = self.get_entry(db_path)?;
        let _guard = entry
            .write_lock
            .lock()
            .map_err(|_| ThreadError::Validation("Pool write lock poisoned".to_string()))?;

        retry_on_busy(|| {
            let mut conn =
                db::db_connect(&entry.db_path.to_string_lossy(), WRITE_BUSY_TIMEOUT_SECS)?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let out = f(&tx)?;
            tx.commit()?;
            Ok(out)
        })
    }

    /// Run `f` with a read connection (no mutex serialization).
    pub fn with_read<F, R>(&self, db_path: &Path, f: F) -> Result<R, ThreadError>
    where
        F: FnOnce(&Connection) -> Result<R, ThreadError>,
    {
        let conn = db::db_connect(&db_path.to_string_lossy(), READ_BUSY_TIMEOUT_SECS)?;
        f(&conn)
    }

    /// Run `f` inside one deferred read transaction, so every query it makes
    /// sees the same committed state even while writers commit alongside.
    pub fn with_snapshot<F, R>(&self, db_path: &Path, f: F) -> Result<R, ThreadError>
    where
        F: FnOnce(&Connection) -> Result<R, ThreadError>,
    {
        let mut conn = db::db_connect(&db_path.to_string_lossy(), READ_BUSY_TIMEOUT_SECS)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }
}

fn retry_on_busy<F, R>(mut f: F) -> Result<R, ThreadError>
where
    F: FnMut() -> Result<R, ThreadError>,
{
    let mut attempt = 0u32;
    loop {
        match f() {
            Ok(v) => return Ok(v),
            Err(e) if e.is_busy() && attempt < MAX_RETRIES => {
                attempt += 1;
                let delay_ms = (BASE_DELAY_MS * 2u64.pow(attempt - 1)).min(MAX_DELAY_MS);
                tracing::debug!(attempt, delay_ms, "database busy, retrying write");
                thread::sleep(Duration::from_millis(delay_ms));
            }
            Err(e) => return Err(e),
        }
    }
}

/// Global pool instance (same lifetime as the process).
pub fn global_pool() -> &'static SqlitePool {
    static POOL: OnceLock<SqlitePool> = OnceLock::new();
    POOL.get_or_init(SqlitePool::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_rolls_back_on_error() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("pool.db");
        let pool = global_pool();

        pool.with_write(&path, |conn| {
            conn.execute_batch("CREATE TABLE t (v INTEGER)")?;
            Ok(())
        })
        .unwrap();

        let result: Result<(), ThreadError> = pool.with_write(&path, |conn| {
            conn.execute("INSERT INTO t (v) VALUES (1)", [])?;
            Err(ThreadError::Validation("abort".to_string()))
        });
        assert!(result.is_err());

        let count: i64 = pool
            .with_read(&path, |conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM t", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_snapshot_ignores_commits_made_after_it_started() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("snapshot.db");
        let pool = global_pool();
        let count = |conn: &Connection| -> Result<i64, ThreadError> {
            Ok(conn.query_row("SELECT COUNT(*) FROM t", [], |r| r.get(0))?)
        };

        pool.with_write(&path, |conn| {
            conn.execute_batch("CREATE TABLE t (v INTEGER); INSERT INTO t (v) VALUES (1);")?;
            Ok(())
        })
        .unwrap();

        let (before, after) = pool
            .with_snapshot(&path, |conn| {
                let before = count(conn)?;
                pool.with_write(&path, |w| {
                    w.execute("INSERT INTO t (v) VALUES (2)", [])?;
                    Ok(())
                })?;
                Ok((before, count(conn)?))
            })
            .unwrap();
        assert_eq!((before, after), (1, 1));

        assert_eq!(pool.with_read(&path, count).unwrap(), 2);
    }

    #[test]
    fn test_non_busy_errors_are_not_retried() {
        let mut calls = 0;
        let result: Result<(), ThreadError> = retry_on_busy(|| {
            calls += 1;
            Err(ThreadError::Validation("nope".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
