//! Entities with no thread link of the kind their stage needs.

use crate::core::error::ThreadError;
use crate::core::store::Store;
use crate::thread::external;
use crate::thread::links;
use crate::thread::resolver::NameResolver;
use crate::thread::types::EntityType;
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrphanEntity {
    pub entity_type: String,
    pub entity_id: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct OrphanReport {
    pub project_id: String,
    pub requirements_without_model: Vec<OrphanEntity>,
    pub blocks_without_code: Vec<OrphanEntity>,
    pub code_without_tests: Vec<OrphanEntity>,
    pub controls_without_links: Vec<OrphanEntity>,
}

impl OrphanReport {
    pub fn total(&self) -> usize {
        self.requirements_without_model.len()
            + self.blocks_without_code.len()
            + self.code_without_tests.len()
            + self.controls_without_links.len()
    }
}

/// Whether `entity` has a link, either direction, to any entity of `other`.
/// `other = None` accepts any counterpart.
pub(crate) fn has_link_with(
    conn: &Connection,
    project_id: &str,
    entity: (EntityType, &str),
    other: Option<EntityType>,
) -> Result<bool, ThreadError> {
    let other = other.map(|t| t.as_str());
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM digital_thread_links
         WHERE project_id = ?1
           AND ((source_type = ?2 AND source_id = ?3 AND (?4 IS NULL OR target_type = ?4))
             OR (target_type = ?2 AND target_id = ?3 AND (?4 IS NULL OR source_type = ?4)))",
        params![project_id, entity.0.as_str(), entity.1, other],
        |r| r.get(0),
    )?;
    Ok(count > 0)
}

fn orphan(resolver: &mut NameResolver<'_>, entity_type: EntityType, id: &str) -> OrphanEntity {
    OrphanEntity {
        entity_type: entity_type.as_str().to_string(),
        entity_id: id.to_string(),
        label: resolver.resolve(entity_type.as_str(), id),
    }
}

pub(crate) fn orphans_conn(conn: &Connection, project_id: &str) -> Result<OrphanReport, ThreadError> {
    let mut resolver = NameResolver::new(conn);
    let mut report = OrphanReport {
        project_id: project_id.to_string(),
        ..Default::default()
    };

    for req in external::requirements(conn, project_id)? {
        if !has_link_with(
            conn,
            project_id,
            (EntityType::DoorsRequirement, &req.id),
            Some(EntityType::SysmlElement),
        )? {
            report.requirements_without_model.push(orphan(
                &mut resolver,
                EntityType::DoorsRequirement,
                &req.id,
            ));
        }
    }

    for block in external::model_elements(conn, project_id, Some("block"))? {
        if !has_link_with(
            conn,
            project_id,
            (EntityType::SysmlElement, &block.id),
            Some(EntityType::CodeModule),
        )? {
            report
                .blocks_without_code
                .push(orphan(&mut resolver, EntityType::SysmlElement, &block.id));
        }
    }

    for code_id in links::referenced_code_modules(conn, project_id)? {
        if !has_link_with(
            conn,
            project_id,
            (EntityType::CodeModule, &code_id),
            Some(EntityType::TestFile),
        )? {
            report
                .code_without_tests
                .push(orphan(&mut resolver, EntityType::CodeModule, &code_id));
        }
    }

    for control_id in external::project_controls(conn, project_id)? {
        if !has_link_with(conn, project_id, (EntityType::NistControl, &control_id), None)? {
            report.controls_without_links.push(orphan(
                &mut resolver,
                EntityType::NistControl,
                &control_id,
            ));
        }
    }

    Ok(report)
}

pub fn find_orphans(store: &Store, project_id: &str) -> Result<OrphanReport, ThreadError> {
    store.with_read(|conn| orphans_conn(conn, project_id))
}
