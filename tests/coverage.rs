mod common;

use common::{PROJECT, bare_fixture, fixture, seed_full_chain};
use dthread::thread::coverage;
use dthread::thread::types::{EntityType, LinkType};

#[test]
fn empty_project_reports_zero_everywhere() {
    let fx = fixture();
    let cov = coverage::compute_coverage(&fx.store, PROJECT).expect("coverage");
    assert_eq!(cov.requirement_coverage, 0.0);
    assert_eq!(cov.model_coverage, 0.0);
    assert_eq!(cov.test_coverage, 0.0);
    assert_eq!(cov.control_coverage, 0.0);
    assert_eq!(cov.overall_thread_completeness, 0.0);
    assert_eq!(cov.counts.requirements_total, 0);
}

#[test]
fn missing_external_tables_read_as_empty() {
    let fx = bare_fixture();
    fx.link(
        (EntityType::CodeModule, "src/a.rs"),
        (EntityType::TestFile, "tests/a.rs"),
        LinkType::Verifies,
    );
    let cov = coverage::compute_coverage(&fx.store, PROJECT).expect("coverage");
    assert_eq!(cov.counts.requirements_total, 0);
    assert_eq!(cov.counts.blocks_total, 0);
    assert_eq!(cov.counts.controls_total, 0);
    assert_eq!(cov.test_coverage, 100.0);
}

#[test]
fn full_chain_is_complete() {
    let fx = fixture();
    seed_full_chain(&fx);

    let cov = coverage::compute_coverage(&fx.store, PROJECT).expect("coverage");
    assert_eq!(cov.requirement_coverage, 100.0);
    assert_eq!(cov.model_coverage, 100.0);
    assert_eq!(cov.test_coverage, 100.0);
    assert_eq!(cov.control_coverage, 100.0);
    assert_eq!(cov.overall_thread_completeness, 100.0);

    let chains = coverage::requirement_chains(&fx.store, PROJECT).expect("chains");
    assert_eq!(chains.len(), 1);
    let path = chains[0].path.as_ref().expect("complete path");
    assert_eq!(path.model_id, "M1");
    assert_eq!(path.code_id, "src/nav_controller.rs");
    assert_eq!(path.test_ids, vec!["tests/nav_controller.rs".to_string()]);
}

#[test]
fn chain_without_control_is_incomplete() {
    let fx = fixture();
    fx.requirement("R1", "REQ-001", "Navigate");
    fx.link((EntityType::DoorsRequirement, "R1"), (EntityType::SysmlElement, "M1"), LinkType::Satisfies);
    fx.link((EntityType::SysmlElement, "M1"), (EntityType::CodeModule, "src/m1.rs"), LinkType::Implements);
    fx.link((EntityType::CodeModule, "src/m1.rs"), (EntityType::TestFile, "tests/m1.rs"), LinkType::Verifies);

    let cov = coverage::compute_coverage(&fx.store, PROJECT).expect("coverage");
    assert_eq!(cov.requirement_coverage, 100.0);
    assert_eq!(cov.overall_thread_completeness, 0.0);

    // A control on the test file anchors the chain.
    fx.link((EntityType::NistControl, "SI-10"), (EntityType::TestFile, "tests/m1.rs"), LinkType::TracesTo);
    let cov = coverage::compute_coverage(&fx.store, PROJECT).expect("coverage");
    assert_eq!(cov.overall_thread_completeness, 100.0);
}

#[test]
fn partial_coverage_rounds_to_two_decimals() {
    let fx = fixture();
    for (id, rid) in [("R1", "REQ-1"), ("R2", "REQ-2"), ("R3", "REQ-3")] {
        fx.requirement(id, rid, "req");
    }
    fx.link((EntityType::DoorsRequirement, "R1"), (EntityType::SysmlElement, "M1"), LinkType::Satisfies);

    fx.element("B1", "Alpha", "block", None);
    fx.element("B2", "Beta", "block", None);
    fx.element("P1", "Gamma", "port", None);
    fx.link((EntityType::SysmlElement, "B1"), (EntityType::CodeModule, "src/alpha.rs"), LinkType::Implements);
    fx.link((EntityType::SysmlElement, "P1"), (EntityType::CodeModule, "src/gamma.rs"), LinkType::Implements);

    fx.control("AC-2", "Account Management", true);
    fx.control("AU-2", "Event Logging", true);
    fx.control("SC-8", "Transmission Confidentiality", false);
    fx.link((EntityType::SysmlElement, "B1"), (EntityType::NistControl, "AU-2"), LinkType::Satisfies);
    fx.link((EntityType::SysmlElement, "B2"), (EntityType::NistControl, "SC-8"), LinkType::Satisfies);

    let cov = coverage::compute_coverage(&fx.store, PROJECT).expect("coverage");
    assert_eq!(cov.requirement_coverage, 33.33);
    assert_eq!(cov.counts.blocks_total, 2, "only blocks count toward model coverage");
    assert_eq!(cov.model_coverage, 50.0);
    assert_eq!(cov.counts.code_modules_total, 2);
    assert_eq!(cov.test_coverage, 0.0);
    assert_eq!(cov.counts.controls_total, 2, "baseline controls only");
    assert_eq!(cov.control_coverage, 50.0);

    for pct in [
        cov.requirement_coverage,
        cov.model_coverage,
        cov.test_coverage,
        cov.control_coverage,
        cov.overall_thread_completeness,
    ] {
        assert!((0.0..=100.0).contains(&pct));
    }
}

#[test]
fn coverage_is_project_scoped() {
    let fx = fixture();
    seed_full_chain(&fx);
    let other = coverage::compute_coverage(&fx.store, "OTHER").expect("coverage");
    assert_eq!(other.counts.requirements_total, 0);
    assert_eq!(other.counts.code_modules_total, 0);
}

#[test]
fn broken_path_does_not_hide_a_complete_one() {
    let fx = fixture();
    fx.requirement("R1", "REQ-001", "Navigate");
    fx.control("AC-2", "Account Management", true);

    // M1 reaches code that has no test.
    fx.link((EntityType::DoorsRequirement, "R1"), (EntityType::SysmlElement, "M1"), LinkType::Satisfies);
    fx.link((EntityType::SysmlElement, "M1"), (EntityType::CodeModule, "src/m1.rs"), LinkType::Implements);

    // M2 carries the full chain with a control on the code.
    fx.link((EntityType::DoorsRequirement, "R1"), (EntityType::SysmlElement, "M2"), LinkType::Satisfies);
    fx.link((EntityType::SysmlElement, "M2"), (EntityType::CodeModule, "src/m2.rs"), LinkType::Implements);
    fx.link((EntityType::CodeModule, "src/m2.rs"), (EntityType::TestFile, "tests/m2.rs"), LinkType::Verifies);
    fx.link((EntityType::CodeModule, "src/m2.rs"), (EntityType::NistControl, "AC-2"), LinkType::MapsTo);

    let cov = coverage::compute_coverage(&fx.store, PROJECT).expect("coverage");
    assert_eq!(cov.overall_thread_completeness, 100.0);
    assert_eq!(cov.counts.requirements_complete, 1);

    let chains = coverage::requirement_chains(&fx.store, PROJECT).expect("chains");
    assert_eq!(chains.len(), 1);
    assert!(chains[0].complete);
    let path = chains[0].path.as_ref().expect("complete path");
    assert_eq!(path.model_id, "M2");
    assert_eq!(path.code_id, "src/m2.rs");
    assert_eq!(path.test_ids, vec!["tests/m2.rs".to_string()]);
}
