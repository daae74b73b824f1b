//! Store handle for the digital thread database.
//!
//! A `Store` names the SQLite file that holds the link table (and, in most
//! deployments, the externally owned artifact tables beside it) together with
//! the audit sink that mutations report to.

use crate::core::audit::{AuditSink, JsonlAuditSink, NullAuditSink};
use crate::core::config::ThreadConfig;
use crate::core::db;
use crate::core::error::ThreadError;
use crate::core::pool;
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Clone)]
pub struct Store {
    /// Absolute path to the SQLite database
    pub db_path: PathBuf,
    audit: Arc<dyn AuditSink>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("db_path", &self.db_path)
            .finish_non_exhaustive()
    }
}

impl Store {
    /// Open (creating if needed) the database at `db_path` and ensure the link schema.
    pub fn open(db_path: &Path, audit: Arc<dyn AuditSink>) -> Result<Self, ThreadError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let store = Self {
            db_path: db_path.to_path_buf(),
            audit,
        };
        store.with_write(db::apply_link_schema)?;
        Ok(store)
    }

    pub fn from_config(config: &ThreadConfig) -> Result<Self, ThreadError> {
        Self::open(
            &config.db_path,
            Arc::new(JsonlAuditSink::new(&config.audit_log)),
        )
    }

    /// Store without an audit trail.
    pub fn open_unaudited(db_path: &Path) -> Result<Self, ThreadError> {
        Self::open(db_path, Arc::new(NullAuditSink))
    }

    pub fn audit(&self) -> &dyn AuditSink {
        self.audit.as_ref()
    }

    pub fn with_read<F, R>(&self, f: F) -> Result<R, ThreadError>
    where
        F: FnOnce(&Connection) -> Result<R, ThreadError>,
    {
        pool::global_pool().with_read(&self.db_path, f)
    }

    /// Several reads against one consistent snapshot.
    pub fn with_snapshot<F, R>(&self, f: F) -> Result<R, ThreadError>
    where
        F: FnOnce(&Connection) -> Result<R, ThreadError>,
    {
        pool::global_pool().with_snapshot(&self.db_path, f)
    }

    pub fn with_write<F, R>(&self, f: F) -> Result<R, ThreadError>
    where
        F: FnMut(&Connection) -> Result<R, ThreadError>,
    {
        pool::global_pool().with_write(&self.db_path, f)
    }
}
