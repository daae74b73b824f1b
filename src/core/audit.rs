//! Audit sink boundary.
//!
//! Every mutating thread operation reports what it did to an external audit
//! trail. The trail is someone else's system: a failing sink is logged and
//! otherwise ignored, it never changes the outcome of the operation that emitted.

use crate::core::error::ThreadError;
use crate::core::time;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AuditEvent {
    pub event_id: String,
    pub ts: String,
    pub event_type: String,
    pub actor: String,
    pub action: String,
    pub project_id: String,
    pub details: JsonValue,
}

impl AuditEvent {
    pub fn new(
        event_type: &str,
        actor: &str,
        action: impl Into<String>,
        project_id: &str,
        details: JsonValue,
    ) -> Self {
        Self {
            event_id: time::new_event_id(),
            ts: time::now_epoch_z(),
            event_type: event_type.to_string(),
            actor: actor.to_string(),
            action: action.into(),
            project_id: project_id.to_string(),
            details,
        }
    }
}

pub trait AuditSink: Send + Sync {
    fn emit(&self, event: &AuditEvent) -> Result<(), ThreadError>;
}

/// Appends one JSON object per line.
pub struct JsonlAuditSink {
    path: PathBuf,
}

impl JsonlAuditSink {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for JsonlAuditSink {
    fn emit(&self, event: &AuditEvent) -> Result<(), ThreadError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(f, "{}", serde_json::to_string(event)?)?;
        Ok(())
    }
}

pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn emit(&self, _event: &AuditEvent) -> Result<(), ThreadError> {
        Ok(())
    }
}

/// Fire-and-forget emission.
pub fn emit_best_effort(sink: &dyn AuditSink, event: AuditEvent) {
    if let Err(e) = sink.emit(&event) {
        tracing::warn!(
            event_type = %event.event_type,
            project_id = %event.project_id,
            error = %e,
            "audit sink rejected event; continuing"
        );
    }
}
