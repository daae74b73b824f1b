//! Read-only access to the artifact tables owned by the surrounding system.
//!
//! Any of these tables may be missing; an absent table reads as empty.

use crate::core::db;
use crate::core::error::ThreadError;
use crate::core::schemas;
use rusqlite::{Connection, OptionalExtension, params};

#[derive(Debug, Clone, PartialEq)]
pub struct Requirement {
    pub id: String,
    pub requirement_id: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelElement {
    pub id: String,
    pub name: String,
    pub element_type: String,
    pub stereotype: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CodeArtifact {
    pub code_path: String,
    pub code_type: String,
}

impl CodeArtifact {
    pub fn is_test(&self) -> bool {
        self.code_type.eq_ignore_ascii_case("test")
    }
}

pub fn requirements(conn: &Connection, project_id: &str) -> Result<Vec<Requirement>, ThreadError> {
    if !db::table_exists(conn, schemas::DOORS_REQUIREMENTS_TABLE)? {
        return Ok(Vec::new());
    }
    let mut stmt = conn.prepare(
        "SELECT id, requirement_id, title FROM doors_requirements
         WHERE project_id = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![project_id], |row| {
        Ok(Requirement {
            id: row.get(0)?,
            requirement_id: row.get(1)?,
            title: row.get(2)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Model elements of the project; `element_type` narrows to one kind (e.g. `block`).
pub fn model_elements(
    conn: &Connection,
    project_id: &str,
    element_type: Option<&str>,
) -> Result<Vec<ModelElement>, ThreadError> {
    if !db::table_exists(conn, schemas::SYSML_ELEMENTS_TABLE)? {
        return Ok(Vec::new());
    }
    let mut stmt = conn.prepare(
        "SELECT id, name, element_type, stereotype, description FROM sysml_elements
         WHERE project_id = ?1 AND (?2 IS NULL OR element_type = ?2) ORDER BY id",
    )?;
    let rows = stmt.query_map(params![project_id, element_type], |row| {
        Ok(ModelElement {
            id: row.get(0)?,
            name: row.get(1)?,
            element_type: row.get(2)?,
            stereotype: row.get(3)?,
            description: row.get(4)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// The project's control baseline.
pub fn project_controls(conn: &Connection, project_id: &str) -> Result<Vec<String>, ThreadError> {
    if !db::table_exists(conn, schemas::PROJECT_CONTROLS_TABLE)? {
        return Ok(Vec::new());
    }
    let mut stmt = conn.prepare(
        "SELECT DISTINCT control_id FROM project_controls WHERE project_id = ?1 ORDER BY control_id",
    )?;
    let rows = stmt.query_map(params![project_id], |row| row.get(0))?;
    Ok(rows.collect::<Result<Vec<String>, _>>()?)
}

pub fn code_artifacts(conn: &Connection, project_id: &str) -> Result<Vec<CodeArtifact>, ThreadError> {
    if !db::table_exists(conn, schemas::MODEL_CODE_MAPPINGS_TABLE)? {
        return Ok(Vec::new());
    }
    let mut stmt = conn.prepare(
        "SELECT DISTINCT code_path, code_type FROM model_code_mappings
         WHERE project_id = ?1 ORDER BY code_path",
    )?;
    let rows = stmt.query_map(params![project_id], |row| {
        Ok(CodeArtifact {
            code_path: row.get(0)?,
            code_type: row.get(1)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// `Some(exists)` when the table is present, `None` when it is not.
pub fn row_exists(conn: &Connection, table: &str, id: &str) -> Result<Option<bool>, ThreadError> {
    if !db::table_exists(conn, table)? {
        return Ok(None);
    }
    let sql = format!("SELECT 1 FROM {} WHERE id = ?1", table);
    let hit: Option<i64> = conn
        .query_row(&sql, params![id], |row| row.get(0))
        .optional()?;
    Ok(Some(hit.is_some()))
}
