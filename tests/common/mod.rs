#![allow(dead_code)]

use dthread::core::audit::{AuditEvent, AuditSink, JsonlAuditSink};
use dthread::core::db;
use dthread::core::error::ThreadError;
use dthread::core::store::Store;
use dthread::thread::links;
use dthread::thread::types::{EntityType, LinkType, NewLink};
use rusqlite::{Connection, params};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

pub const PROJECT: &str = "P1";
pub const ACTOR: &str = "tester";

pub struct Fixture {
    pub _tmp: TempDir,
    pub store: Store,
    pub audit_path: PathBuf,
}

impl Fixture {
    pub fn conn(&self) -> Connection {
        Connection::open(&self.store.db_path).expect("open fixture db")
    }

    pub fn link(
        &self,
        source: (EntityType, &str),
        target: (EntityType, &str),
        link_type: LinkType,
    ) -> String {
        links::create_link(
            &self.store,
            &NewLink::explicit(PROJECT, source, target, link_type, ACTOR),
        )
        .expect("create link")
    }

    pub fn requirement(&self, id: &str, requirement_id: &str, title: &str) {
        self.conn()
            .execute(
                "INSERT INTO doors_requirements(id, project_id, requirement_id, title) VALUES(?1, ?2, ?3, ?4)",
                params![id, PROJECT, requirement_id, title],
            )
            .expect("insert requirement");
    }

    pub fn element(&self, id: &str, name: &str, element_type: &str, description: Option<&str>) {
        self.conn()
            .execute(
                "INSERT INTO sysml_elements(id, project_id, name, element_type, description) VALUES(?1, ?2, ?3, ?4, ?5)",
                params![id, PROJECT, name, element_type, description],
            )
            .expect("insert element");
    }

    pub fn control(&self, id: &str, title: &str, in_baseline: bool) {
        let conn = self.conn();
        let family = id.split('-').next().unwrap_or_default();
        conn.execute(
            "INSERT INTO compliance_controls(id, family, title) VALUES(?1, ?2, ?3)",
            params![id, family, title],
        )
        .expect("insert control");
        if in_baseline {
            conn.execute(
                "INSERT INTO project_controls(project_id, control_id) VALUES(?1, ?2)",
                params![PROJECT, id],
            )
            .expect("insert baseline control");
        }
    }

    pub fn code_artifact(&self, path: &str, code_type: &str) {
        self.conn()
            .execute(
                "INSERT INTO model_code_mappings(project_id, code_path, code_type) VALUES(?1, ?2, ?3)",
                params![PROJECT, path, code_type],
            )
            .expect("insert code mapping");
    }

    pub fn audit_lines(&self) -> Vec<serde_json::Value> {
        std::fs::read_to_string(&self.audit_path)
            .unwrap_or_default()
            .lines()
            .map(|l| serde_json::from_str(l).expect("audit line is json"))
            .collect()
    }
}

/// Fresh store in a tempdir with a JSONL audit trail and no external tables.
pub fn bare_fixture() -> Fixture {
    let tmp = TempDir::new().expect("tempdir");
    let db_path = tmp.path().join("thread.db");
    let audit_path = tmp.path().join("audit.events.jsonl");
    let store = Store::open(&db_path, Arc::new(JsonlAuditSink::new(&audit_path)))
        .expect("open store");
    Fixture {
        _tmp: tmp,
        store,
        audit_path,
    }
}

/// Fresh store with every external table created (and empty).
pub fn fixture() -> Fixture {
    let fx = bare_fixture();
    fx.store
        .with_write(db::apply_external_schema)
        .expect("external schema");
    fx
}

/// Sink that always fails.
pub struct BrokenSink;

impl AuditSink for BrokenSink {
    fn emit(&self, _event: &AuditEvent) -> Result<(), ThreadError> {
        Err(ThreadError::Io(std::io::Error::other("sink offline")))
    }
}

/// The canonical four-hop thread:
/// `R1 -satisfies-> M1 -implements-> C1 -verifies-> T1`, `C1 -maps_to-> AC-2`.
pub fn seed_full_chain(fx: &Fixture) -> ChainIds {
    fx.requirement("R1", "REQ-001", "Navigate to waypoint");
    fx.element("M1", "NavController", "block", None);
    fx.control("AC-2", "Account Management", true);

    let req_model = fx.link(
        (EntityType::DoorsRequirement, "R1"),
        (EntityType::SysmlElement, "M1"),
        LinkType::Satisfies,
    );
    let model_code = fx.link(
        (EntityType::SysmlElement, "M1"),
        (EntityType::CodeModule, "src/nav_controller.rs"),
        LinkType::Implements,
    );
    let code_test = fx.link(
        (EntityType::CodeModule, "src/nav_controller.rs"),
        (EntityType::TestFile, "tests/nav_controller.rs"),
        LinkType::Verifies,
    );
    let code_control = fx.link(
        (EntityType::CodeModule, "src/nav_controller.rs"),
        (EntityType::NistControl, "AC-2"),
        LinkType::MapsTo,
    );
    ChainIds {
        req_model,
        model_code,
        code_test,
        code_control,
    }
}

pub struct ChainIds {
    pub req_model: String,
    pub model_code: String,
    pub code_test: String,
    pub code_control: String,
}
