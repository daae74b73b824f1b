//! Human labels for entity references.
//!
//! Requirement, model, control, and rule labels come from externally owned
//! tables. Those tables may not exist in a given deployment, and rows may have
//! been removed since a link was made; both cases fall back to the raw id.

use crate::core::error::ThreadError;
use crate::core::store::Store;
use crate::thread::types::EntityType;
use rusqlite::{Connection, OptionalExtension, params};
use rustc_hash::FxHashMap;

pub fn resolve(conn: &Connection, entity_type: &str, entity_id: &str) -> String {
    let Ok(kind) = EntityType::parse(entity_type) else {
        return entity_id.to_string();
    };
    match kind {
        EntityType::CodeModule | EntityType::TestFile => entity_id.to_string(),
        EntityType::ComplianceArtifact => format!("artifact: {}", entity_id),
        _ => lookup_label(conn, kind, entity_id).unwrap_or_else(|| entity_id.to_string()),
    }
}

fn lookup_label(conn: &Connection, kind: EntityType, entity_id: &str) -> Option<String> {
    let (table, column) = kind.lookup_table()?;
    let sql = format!("SELECT {} FROM {} WHERE id = ?1", column, table);
    match conn
        .query_row(&sql, params![entity_id], |row| row.get::<_, Option<String>>(0))
        .optional()
    {
        Ok(Some(Some(label))) if !label.is_empty() => Some(label),
        Ok(_) => None,
        Err(e) => {
            tracing::debug!(table, entity_id, error = %e, "label lookup degraded to raw id");
            None
        }
    }
}

/// Store-level convenience wrapper around [`resolve`].
pub fn resolve_name(store: &Store, entity_type: &str, entity_id: &str) -> Result<String, ThreadError> {
    store.with_read(|conn| Ok(resolve(conn, entity_type, entity_id)))
}

/// Memoizing resolver for traversals that revisit the same entities.
pub struct NameResolver<'c> {
    conn: &'c Connection,
    cache: FxHashMap<(String, String), String>,
}

impl<'c> NameResolver<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self {
            conn,
            cache: FxHashMap::default(),
        }
    }

    pub fn resolve(&mut self, entity_type: &str, entity_id: &str) -> String {
        let key = (entity_type.to_string(), entity_id.to_string());
        if let Some(hit) = self.cache.get(&key) {
            return hit.clone();
        }
        let label = resolve(self.conn, entity_type, entity_id);
        self.cache.insert(key, label.clone());
        label
    }
}
