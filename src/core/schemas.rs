//! Centralized schema definitions for the digital thread database.
//!
//! The engine owns exactly one table, `digital_thread_links`. The remaining
//! tables are owned by the surrounding system (requirements import, model
//! import, compliance baselines) and are only ever read here. Their DDL is kept
//! so that standalone workspaces and tests can stand them up with the same shape.

pub const LINKS_SCHEMA_VERSION: u32 = 1;

pub const LINKS_DB_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS digital_thread_links (
        id TEXT PRIMARY KEY,
        project_id TEXT NOT NULL,
        source_type TEXT NOT NULL,
        source_id TEXT NOT NULL,
        target_type TEXT NOT NULL,
        target_id TEXT NOT NULL,
        link_type TEXT NOT NULL,
        confidence REAL NOT NULL DEFAULT 1.0,
        evidence TEXT,
        created_by TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
";

/// Uniqueness of the link tuple. `INSERT OR REPLACE` resolves against this index.
pub const LINKS_INDEX_UNIQUE: &str = "
    CREATE UNIQUE INDEX IF NOT EXISTS idx_links_unique ON digital_thread_links(
        project_id, source_type, source_id, target_type, target_id, link_type
    )
";
pub const LINKS_INDEX_SOURCE: &str = "CREATE INDEX IF NOT EXISTS idx_links_source ON digital_thread_links(project_id, source_type, source_id)";
pub const LINKS_INDEX_TARGET: &str = "CREATE INDEX IF NOT EXISTS idx_links_target ON digital_thread_links(project_id, target_type, target_id)";

pub const META_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS digital_thread_meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
";

// --- Externally owned tables ---

pub const DOORS_REQUIREMENTS_TABLE: &str = "doors_requirements";
pub const SYSML_ELEMENTS_TABLE: &str = "sysml_elements";
pub const COMPLIANCE_CONTROLS_TABLE: &str = "compliance_controls";
pub const STIG_RULES_TABLE: &str = "stig_rules";
pub const PROJECT_CONTROLS_TABLE: &str = "project_controls";
pub const MODEL_CODE_MAPPINGS_TABLE: &str = "model_code_mappings";

pub const EXTERNAL_DOORS_REQUIREMENTS: &str = "
    CREATE TABLE IF NOT EXISTS doors_requirements (
        id TEXT PRIMARY KEY,
        project_id TEXT NOT NULL,
        requirement_id TEXT NOT NULL,
        title TEXT NOT NULL,
        description TEXT
    )
";

pub const EXTERNAL_SYSML_ELEMENTS: &str = "
    CREATE TABLE IF NOT EXISTS sysml_elements (
        id TEXT PRIMARY KEY,
        project_id TEXT NOT NULL,
        name TEXT NOT NULL,
        element_type TEXT NOT NULL,
        stereotype TEXT,
        description TEXT
    )
";

pub const EXTERNAL_COMPLIANCE_CONTROLS: &str = "
    CREATE TABLE IF NOT EXISTS compliance_controls (
        id TEXT PRIMARY KEY,
        family TEXT NOT NULL,
        title TEXT NOT NULL
    )
";

pub const EXTERNAL_STIG_RULES: &str = "
    CREATE TABLE IF NOT EXISTS stig_rules (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        severity TEXT
    )
";

pub const EXTERNAL_PROJECT_CONTROLS: &str = "
    CREATE TABLE IF NOT EXISTS project_controls (
        project_id TEXT NOT NULL,
        control_id TEXT NOT NULL,
        PRIMARY KEY (project_id, control_id)
    )
";

pub const EXTERNAL_MODEL_CODE_MAPPINGS: &str = "
    CREATE TABLE IF NOT EXISTS model_code_mappings (
        project_id TEXT NOT NULL,
        code_path TEXT NOT NULL,
        code_type TEXT NOT NULL,
        PRIMARY KEY (project_id, code_path)
    )
";

pub const EXTERNAL_TABLES: &[&str] = &[
    EXTERNAL_DOORS_REQUIREMENTS,
    EXTERNAL_SYSML_ELEMENTS,
    EXTERNAL_COMPLIANCE_CONTROLS,
    EXTERNAL_STIG_RULES,
    EXTERNAL_PROJECT_CONTROLS,
    EXTERNAL_MODEL_CODE_MAPPINGS,
];
