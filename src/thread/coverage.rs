//! Coverage metrics for a project's thread.
//!
//! Five percentages, each rounded to two decimals and `0` on an empty
//! denominator. Thread completeness asks, per requirement, whether some
//! requirement -> model -> code -> test path exists with a control attached
//! somewhere along it. The search stops at the first such path.

use crate::core::error::ThreadError;
use crate::core::store::Store;
use crate::thread::external;
use crate::thread::links;
use crate::thread::types::{EntityType, percentage};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageCounts {
    pub requirements_total: usize,
    pub requirements_modeled: usize,
    pub requirements_complete: usize,
    pub blocks_total: usize,
    pub blocks_implemented: usize,
    pub code_modules_total: usize,
    pub code_modules_tested: usize,
    pub controls_total: usize,
    pub controls_linked: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageReport {
    pub project_id: String,
    pub requirement_coverage: f64,
    pub model_coverage: f64,
    pub test_coverage: f64,
    pub control_coverage: f64,
    pub overall_thread_completeness: f64,
    pub counts: CoverageCounts,
}

/// The path that made a requirement complete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainPath {
    pub model_id: String,
    pub code_id: String,
    pub test_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequirementChain {
    pub requirement_id: String,
    pub label: String,
    pub complete: bool,
    pub path: Option<ChainPath>,
}

/// First complete chain for `requirement_id`, if any.
pub(crate) fn find_complete_chain(
    conn: &Connection,
    project_id: &str,
    requirement_id: &str,
) -> Result<Option<ChainPath>, ThreadError> {
    let req_has_control = links::has_control_link(
        conn,
        project_id,
        EntityType::DoorsRequirement.as_str(),
        requirement_id,
    )?;

    let models = links::linked_targets(
        conn,
        project_id,
        (EntityType::DoorsRequirement, requirement_id),
        EntityType::SysmlElement,
    )?;
    for model_id in models {
        let codes = links::linked_targets(
            conn,
            project_id,
            (EntityType::SysmlElement, &model_id),
            EntityType::CodeModule,
        )?;
        for code_id in codes {
            let tests = links::linked_targets(
                conn,
                project_id,
                (EntityType::CodeModule, &code_id),
                EntityType::TestFile,
            )?;
            if tests.is_empty() {
                continue;
            }

            let mut anchored = req_has_control
                || links::has_control_link(
                    conn,
                    project_id,
                    EntityType::SysmlElement.as_str(),
                    &model_id,
                )?
                || links::has_control_link(
                    conn,
                    project_id,
                    EntityType::CodeModule.as_str(),
                    &code_id,
                )?;
            if !anchored {
                for test_id in &tests {
                    if links::has_control_link(
                        conn,
                        project_id,
                        EntityType::TestFile.as_str(),
                        test_id,
                    )? {
                        anchored = true;
                        break;
                    }
                }
            }

            if anchored {
                return Ok(Some(ChainPath {
                    model_id,
                    code_id,
                    test_ids: tests,
                }));
            }
        }
    }
    Ok(None)
}

fn referenced_controls(conn: &Connection, project_id: &str) -> Result<BTreeSet<String>, ThreadError> {
    let mut stmt = conn.prepare(
        "SELECT source_id FROM digital_thread_links WHERE project_id = ?1 AND source_type = ?2
         UNION
         SELECT target_id FROM digital_thread_links WHERE project_id = ?1 AND target_type = ?2",
    )?;
    let rows = stmt.query_map(
        params![project_id, EntityType::NistControl.as_str()],
        |row| row.get(0),
    )?;
    Ok(rows.collect::<Result<BTreeSet<String>, _>>()?)
}

pub(crate) fn coverage_conn(conn: &Connection, project_id: &str) -> Result<CoverageReport, ThreadError> {
    let chains = requirement_chains_conn(conn, project_id)?;
    coverage_with_chains(conn, project_id, &chains)
}

/// Coverage over `chains`, which must hold one entry per project requirement.
/// Completeness is read off the chains instead of searched again.
pub(crate) fn coverage_with_chains(
    conn: &Connection,
    project_id: &str,
    chains: &[RequirementChain],
) -> Result<CoverageReport, ThreadError> {
    let mut requirements_modeled = 0;
    for chain in chains {
        if chain.complete
            || links::has_outgoing_to(
                conn,
                project_id,
                (EntityType::DoorsRequirement, &chain.requirement_id),
                EntityType::SysmlElement,
            )?
        {
            requirements_modeled += 1;
        }
    }
    let requirements_complete = chains.iter().filter(|c| c.complete).count();

    let blocks = external::model_elements(conn, project_id, Some("block"))?;
    let mut blocks_implemented = 0;
    for block in &blocks {
        if links::has_outgoing_to(
            conn,
            project_id,
            (EntityType::SysmlElement, &block.id),
            EntityType::CodeModule,
        )? {
            blocks_implemented += 1;
        }
    }

    let code_modules = links::referenced_code_modules(conn, project_id)?;
    let mut code_modules_tested = 0;
    for code_id in &code_modules {
        if links::has_outgoing_to(
            conn,
            project_id,
            (EntityType::CodeModule, code_id),
            EntityType::TestFile,
        )? {
            code_modules_tested += 1;
        }
    }

    let controls = external::project_controls(conn, project_id)?;
    let referenced = referenced_controls(conn, project_id)?;
    let controls_linked = controls.iter().filter(|c| referenced.contains(*c)).count();

    let counts = CoverageCounts {
        requirements_total: chains.len(),
        requirements_modeled,
        requirements_complete,
        blocks_total: blocks.len(),
        blocks_implemented,
        code_modules_total: code_modules.len(),
        code_modules_tested,
        controls_total: controls.len(),
        controls_linked,
    };

    Ok(CoverageReport {
        project_id: project_id.to_string(),
        requirement_coverage: percentage(counts.requirements_modeled, counts.requirements_total),
        model_coverage: percentage(counts.blocks_implemented, counts.blocks_total),
        test_coverage: percentage(counts.code_modules_tested, counts.code_modules_total),
        control_coverage: percentage(counts.controls_linked, counts.controls_total),
        overall_thread_completeness: percentage(
            counts.requirements_complete,
            counts.requirements_total,
        ),
        counts,
    })
}

pub fn compute_coverage(store: &Store, project_id: &str) -> Result<CoverageReport, ThreadError> {
    store.with_read(|conn| coverage_conn(conn, project_id))
}

pub(crate) fn requirement_chains_conn(
    conn: &Connection,
    project_id: &str,
) -> Result<Vec<RequirementChain>, ThreadError> {
    let mut out = Vec::new();
    for req in external::requirements(conn, project_id)? {
        let path = find_complete_chain(conn, project_id, &req.id)?;
        out.push(RequirementChain {
            complete: path.is_some(),
            label: req.title,
            requirement_id: req.id,
            path,
        });
    }
    Ok(out)
}

/// Per-requirement completeness with the path that satisfied it.
pub fn requirement_chains(store: &Store, project_id: &str) -> Result<Vec<RequirementChain>, ThreadError> {
    store.with_read(|conn| requirement_chains_conn(conn, project_id))
}
