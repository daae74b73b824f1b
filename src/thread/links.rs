//! Link store: typed-edge persistence scoped by project.
//!
//! The tuple `(project_id, source_type, source_id, target_type, target_id, link_type)`
//! is unique. Re-asserting a link replaces the stored row (new id, new
//! confidence/evidence/actor/timestamp) instead of merging into it.

use crate::core::audit::{self, AuditEvent};
use crate::core::error::ThreadError;
use crate::core::store::Store;
use crate::core::time;
use crate::thread::types::{EntityType, Link, LinkType, NewLink, validate_confidence};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const EVENT_LINK_CREATED: &str = "digital_thread.link_created";
pub const EVENT_LINK_DELETED: &str = "digital_thread.link_deleted";

pub(crate) const LINK_COLUMNS: &str = "id, project_id, source_type, source_id, target_type, target_id, \
     link_type, confidence, evidence, created_by, created_at";

/// Optional constraints for `list_links`. `entity_id` matches either endpoint.
#[derive(Debug, Clone, Default)]
pub struct LinkFilter {
    pub source_type: Option<String>,
    pub target_type: Option<String>,
    pub link_type: Option<String>,
    pub entity_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkStats {
    pub total: usize,
    pub by_link_type: BTreeMap<String, usize>,
    /// Keyed `source_type -> target_type`.
    pub by_endpoint_types: BTreeMap<String, usize>,
    pub auto_linked: usize,
}

pub(crate) fn row_to_link(row: &Row<'_>) -> rusqlite::Result<Link> {
    Ok(Link {
        id: row.get(0)?,
        project_id: row.get(1)?,
        source_type: row.get(2)?,
        source_id: row.get(3)?,
        target_type: row.get(4)?,
        target_id: row.get(5)?,
        link_type: row.get(6)?,
        confidence: row.get(7)?,
        evidence: row.get(8)?,
        created_by: row.get(9)?,
        created_at: row.get(10)?,
    })
}

fn validate_new_link(link: &NewLink<'_>) -> Result<(), ThreadError> {
    EntityType::parse(link.source_type)?;
    EntityType::parse(link.target_type)?;
    LinkType::parse(link.link_type)?;
    validate_confidence(link.confidence)?;
    if link.project_id.trim().is_empty() {
        return Err(ThreadError::Validation("project_id must not be empty".to_string()));
    }
    if link.source_id.is_empty() || link.target_id.is_empty() {
        return Err(ThreadError::Validation(
            "source_id and target_id must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// Upsert-by-replace inside the caller's transaction. Returns the new row id.
pub(crate) fn replace_link(conn: &Connection, link: &NewLink<'_>) -> Result<String, ThreadError> {
    let id = time::new_link_id();
    conn.execute(
        "INSERT OR REPLACE INTO digital_thread_links(
             id, project_id, source_type, source_id, target_type, target_id,
             link_type, confidence, evidence, created_by, created_at)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            id,
            link.project_id,
            link.source_type,
            link.source_id,
            link.target_type,
            link.target_id,
            link.link_type,
            link.confidence,
            link.evidence,
            link.actor,
            time::now_epoch_z(),
        ],
    )?;
    Ok(id)
}

pub(crate) fn link_exists(conn: &Connection, link: &NewLink<'_>) -> Result<bool, ThreadError> {
    let found: Option<String> = conn
        .query_row(
            "SELECT id FROM digital_thread_links
             WHERE project_id = ?1 AND source_type = ?2 AND source_id = ?3
               AND target_type = ?4 AND target_id = ?5 AND link_type = ?6",
            params![
                link.project_id,
                link.source_type,
                link.source_id,
                link.target_type,
                link.target_id,
                link.link_type
            ],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Validate and persist a link, replacing any row with the same tuple.
pub fn create_link(store: &Store, link: &NewLink<'_>) -> Result<String, ThreadError> {
    validate_new_link(link)?;

    let id = store.with_write(|conn| replace_link(conn, link))?;

    tracing::info!(
        project_id = link.project_id,
        link_id = %id,
        "{}:{} --[{}]--> {}:{}",
        link.source_type,
        link.source_id,
        link.link_type,
        link.target_type,
        link.target_id
    );

    audit::emit_best_effort(
        store.audit(),
        AuditEvent::new(
            EVENT_LINK_CREATED,
            link.actor,
            format!(
                "Linked {}:{} -> {}:{} ({})",
                link.source_type, link.source_id, link.target_type, link.target_id, link.link_type
            ),
            link.project_id,
            serde_json::json!({
                "link_id": id,
                "source_type": link.source_type,
                "source_id": link.source_id,
                "target_type": link.target_type,
                "target_id": link.target_id,
                "link_type": link.link_type,
                "confidence": link.confidence,
                "evidence": link.evidence,
            }),
        ),
    );

    Ok(id)
}

/// Delete a link owned by `project_id`. A foreign or unknown id reports `false`.
pub fn delete_link(
    store: &Store,
    project_id: &str,
    link_id: &str,
    actor: &str,
) -> Result<bool, ThreadError> {
    let changes = store.with_write(|conn| {
        Ok(conn.execute(
            "DELETE FROM digital_thread_links WHERE id = ?1 AND project_id = ?2",
            params![link_id, project_id],
        )?)
    })?;

    if changes == 0 {
        tracing::debug!(project_id, link_id, "delete matched no link");
        return Ok(false);
    }

    tracing::info!(project_id, link_id, "link deleted");
    audit::emit_best_effort(
        store.audit(),
        AuditEvent::new(
            EVENT_LINK_DELETED,
            actor,
            format!("Deleted link {}", link_id),
            project_id,
            serde_json::json!({ "link_id": link_id }),
        ),
    );
    Ok(true)
}

pub fn get_link(store: &Store, project_id: &str, link_id: &str) -> Result<Option<Link>, ThreadError> {
    store.with_read(|conn| {
        let sql = format!(
            "SELECT {} FROM digital_thread_links WHERE id = ?1 AND project_id = ?2",
            LINK_COLUMNS
        );
        Ok(conn
            .query_row(&sql, params![link_id, project_id], row_to_link)
            .optional()?)
    })
}

pub fn list_links(
    store: &Store,
    project_id: &str,
    filter: &LinkFilter,
) -> Result<Vec<Link>, ThreadError> {
    store.with_read(|conn| {
        let mut conditions = vec!["project_id = ?1".to_string()];
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> =
            vec![Box::new(project_id.to_string())];

        if let Some(ref st) = filter.source_type {
            param_values.push(Box::new(st.clone()));
            conditions.push(format!("source_type = ?{}", param_values.len()));
        }
        if let Some(ref tt) = filter.target_type {
            param_values.push(Box::new(tt.clone()));
            conditions.push(format!("target_type = ?{}", param_values.len()));
        }
        if let Some(ref lt) = filter.link_type {
            param_values.push(Box::new(lt.clone()));
            conditions.push(format!("link_type = ?{}", param_values.len()));
        }
        if let Some(ref eid) = filter.entity_id {
            param_values.push(Box::new(eid.clone()));
            let idx = param_values.len();
            conditions.push(format!("(source_id = ?{idx} OR target_id = ?{idx})"));
        }

        let sql = format!(
            "SELECT {} FROM digital_thread_links WHERE {} ORDER BY created_at, id",
            LINK_COLUMNS,
            conditions.join(" AND ")
        );
        let mut stmt = conn.prepare(&sql)?;
        let params_refs: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|b| b.as_ref()).collect();
        let rows = stmt.query_map(params_refs.as_slice(), row_to_link)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    })
}

pub fn link_stats(store: &Store, project_id: &str) -> Result<LinkStats, ThreadError> {
    store.with_read(|conn| link_stats_conn(conn, project_id))
}

pub(crate) fn link_stats_conn(conn: &Connection, project_id: &str) -> Result<LinkStats, ThreadError> {
    let links = all_links(conn, project_id)?;
    let mut stats = LinkStats {
        total: links.len(),
        by_link_type: BTreeMap::new(),
        by_endpoint_types: BTreeMap::new(),
        auto_linked: 0,
    };
    for link in &links {
        *stats.by_link_type.entry(link.link_type.clone()).or_default() += 1;
        *stats
            .by_endpoint_types
            .entry(format!("{} -> {}", link.source_type, link.target_type))
            .or_default() += 1;
        if link
            .evidence
            .as_deref()
            .is_some_and(|e| e.starts_with("auto_linked_by_"))
        {
            stats.auto_linked += 1;
        }
    }
    Ok(stats)
}

// --- Connection-level reads shared by the analyzers ---

pub(crate) fn all_links(conn: &Connection, project_id: &str) -> Result<Vec<Link>, ThreadError> {
    let sql = format!(
        "SELECT {} FROM digital_thread_links WHERE project_id = ?1 ORDER BY created_at, id",
        LINK_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![project_id], row_to_link)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Links whose source is `(entity_type, entity_id)`.
pub(crate) fn outgoing(
    conn: &Connection,
    project_id: &str,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Link>, ThreadError> {
    let sql = format!(
        "SELECT {} FROM digital_thread_links
         WHERE project_id = ?1 AND source_type = ?2 AND source_id = ?3
         ORDER BY created_at, id",
        LINK_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![project_id, entity_type, entity_id], row_to_link)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Links whose target is `(entity_type, entity_id)`.
pub(crate) fn incoming(
    conn: &Connection,
    project_id: &str,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Link>, ThreadError> {
    let sql = format!(
        "SELECT {} FROM digital_thread_links
         WHERE project_id = ?1 AND target_type = ?2 AND target_id = ?3
         ORDER BY created_at, id",
        LINK_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![project_id, entity_type, entity_id], row_to_link)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Distinct target ids of `from_type:from_id -> to_type:*` links.
pub(crate) fn linked_targets(
    conn: &Connection,
    project_id: &str,
    from: (EntityType, &str),
    to_type: EntityType,
) -> Result<Vec<String>, ThreadError> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT target_id FROM digital_thread_links
         WHERE project_id = ?1 AND source_type = ?2 AND source_id = ?3 AND target_type = ?4
         ORDER BY target_id",
    )?;
    let rows = stmt.query_map(
        params![project_id, from.0.as_str(), from.1, to_type.as_str()],
        |row| row.get(0),
    )?;
    Ok(rows.collect::<Result<Vec<String>, _>>()?)
}

/// Whether the entity has any link, in either direction, to a `nist_control`.
pub(crate) fn has_control_link(
    conn: &Connection,
    project_id: &str,
    entity_type: &str,
    entity_id: &str,
) -> Result<bool, ThreadError> {
    let control = EntityType::NistControl.as_str();
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM digital_thread_links
         WHERE project_id = ?1
           AND ((source_type = ?2 AND source_id = ?3 AND target_type = ?4)
             OR (target_type = ?2 AND target_id = ?3 AND source_type = ?4))",
        params![project_id, entity_type, entity_id, control],
        |r| r.get(0),
    )?;
    Ok(count > 0)
}

/// Whether the entity has an outgoing link to any entity of `to_type`.
pub(crate) fn has_outgoing_to(
    conn: &Connection,
    project_id: &str,
    from: (EntityType, &str),
    to_type: EntityType,
) -> Result<bool, ThreadError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM digital_thread_links
         WHERE project_id = ?1 AND source_type = ?2 AND source_id = ?3 AND target_type = ?4",
        params![project_id, from.0.as_str(), from.1, to_type.as_str()],
        |r| r.get(0),
    )?;
    Ok(count > 0)
}

/// Distinct ids of every `code_module` appearing at either end of any link.
pub(crate) fn referenced_code_modules(
    conn: &Connection,
    project_id: &str,
) -> Result<Vec<String>, ThreadError> {
    let mut stmt = conn.prepare(
        "SELECT source_id FROM digital_thread_links WHERE project_id = ?1 AND source_type = ?2
         UNION
         SELECT target_id FROM digital_thread_links WHERE project_id = ?1 AND target_type = ?2
         ORDER BY 1",
    )?;
    let rows = stmt.query_map(
        params![project_id, EntityType::CodeModule.as_str()],
        |row| row.get(0),
    )?;
    Ok(rows.collect::<Result<Vec<String>, _>>()?)
}
