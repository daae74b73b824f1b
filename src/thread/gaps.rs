//! Single-hop gap detection.
//!
//! Each existing hop of one stage is checked for the next hop out of its
//! target. Every offending link is reported, so one requirement may surface
//! several gaps.

use crate::core::error::ThreadError;
use crate::core::store::Store;
use crate::thread::links::{self, LINK_COLUMNS, row_to_link};
use crate::thread::resolver::NameResolver;
use crate::thread::types::{EntityType, Link};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};

pub const GAP_MODEL_WITHOUT_CODE: &str = "model_without_code";
pub const GAP_CODE_WITHOUT_TEST: &str = "code_without_test";
pub const GAP_TEST_WITHOUT_CONTROL: &str = "test_without_control";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapEndpoint {
    pub entity_type: String,
    pub entity_id: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gap {
    pub gap_type: String,
    pub description: String,
    /// The existing hop that the gap hangs off.
    pub link_id: String,
    pub source: GapEndpoint,
    pub target: GapEndpoint,
    pub missing_link: String,
}

fn hops(
    conn: &Connection,
    project_id: &str,
    source_type: EntityType,
    target_type: EntityType,
) -> Result<Vec<Link>, ThreadError> {
    let sql = format!(
        "SELECT {} FROM digital_thread_links
         WHERE project_id = ?1 AND source_type = ?2 AND target_type = ?3
         ORDER BY created_at, id",
        LINK_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![project_id, source_type.as_str(), target_type.as_str()],
        row_to_link,
    )?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn endpoint(resolver: &mut NameResolver<'_>, entity_type: &str, entity_id: &str) -> GapEndpoint {
    GapEndpoint {
        entity_type: entity_type.to_string(),
        entity_id: entity_id.to_string(),
        label: resolver.resolve(entity_type, entity_id),
    }
}

pub(crate) fn gaps_conn(conn: &Connection, project_id: &str) -> Result<Vec<Gap>, ThreadError> {
    let mut resolver = NameResolver::new(conn);
    let mut gaps = Vec::new();

    for link in hops(conn, project_id, EntityType::DoorsRequirement, EntityType::SysmlElement)? {
        if !links::has_outgoing_to(
            conn,
            project_id,
            (EntityType::SysmlElement, &link.target_id),
            EntityType::CodeModule,
        )? {
            let source = endpoint(&mut resolver, &link.source_type, &link.source_id);
            let target = endpoint(&mut resolver, &link.target_type, &link.target_id);
            gaps.push(Gap {
                gap_type: GAP_MODEL_WITHOUT_CODE.to_string(),
                description: format!(
                    "Model element '{}' traced from requirement '{}' has no implementing code module",
                    target.label, source.label
                ),
                link_id: link.id,
                source,
                target,
                missing_link: "sysml_element -> code_module".to_string(),
            });
        }
    }

    for link in hops(conn, project_id, EntityType::SysmlElement, EntityType::CodeModule)? {
        if !links::has_outgoing_to(
            conn,
            project_id,
            (EntityType::CodeModule, &link.target_id),
            EntityType::TestFile,
        )? {
            let source = endpoint(&mut resolver, &link.source_type, &link.source_id);
            let target = endpoint(&mut resolver, &link.target_type, &link.target_id);
            gaps.push(Gap {
                gap_type: GAP_CODE_WITHOUT_TEST.to_string(),
                description: format!(
                    "Code module '{}' implementing '{}' has no test file",
                    target.label, source.label
                ),
                link_id: link.id,
                source,
                target,
                missing_link: "code_module -> test_file".to_string(),
            });
        }
    }

    for link in hops(conn, project_id, EntityType::CodeModule, EntityType::TestFile)? {
        let code_anchored = links::has_control_link(
            conn,
            project_id,
            EntityType::CodeModule.as_str(),
            &link.source_id,
        )?;
        let anchored = code_anchored
            || links::has_control_link(
                conn,
                project_id,
                EntityType::TestFile.as_str(),
                &link.target_id,
            )?;
        if !anchored {
            let source = endpoint(&mut resolver, &link.source_type, &link.source_id);
            let target = endpoint(&mut resolver, &link.target_type, &link.target_id);
            gaps.push(Gap {
                gap_type: GAP_TEST_WITHOUT_CONTROL.to_string(),
                description: format!(
                    "Neither code module '{}' nor test file '{}' maps to a NIST control",
                    source.label, target.label
                ),
                link_id: link.id,
                source,
                target,
                missing_link: "code_module|test_file <-> nist_control".to_string(),
            });
        }
    }

    Ok(gaps)
}

pub fn detect_gaps(store: &Store, project_id: &str) -> Result<Vec<Gap>, ThreadError> {
    store.with_read(|conn| gaps_conn(conn, project_id))
}
