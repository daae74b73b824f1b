mod common;

use common::{ACTOR, PROJECT, fixture, seed_full_chain};
use dthread::thread::gaps::GAP_CODE_WITHOUT_TEST;
use dthread::thread::{coverage, gaps, integrity, links, orphans, report, trace};

#[test]
fn full_thread_lifecycle() {
    let fx = fixture();
    let chain = seed_full_chain(&fx);

    let cov = coverage::compute_coverage(&fx.store, PROJECT).expect("coverage");
    assert_eq!(cov.overall_thread_completeness, 100.0);
    assert_eq!(cov.test_coverage, 100.0);

    let tree = trace::trace_forward(&fx.store, PROJECT, "doors_requirement", "R1", 10)
        .expect("trace");
    assert_eq!(tree.entity_count, 4);

    assert!(links::delete_link(&fx.store, PROJECT, &chain.code_test, ACTOR).expect("delete"));

    let cov = coverage::compute_coverage(&fx.store, PROJECT).expect("coverage");
    assert_eq!(cov.test_coverage, 0.0);
    assert_eq!(cov.overall_thread_completeness, 0.0);
    assert_eq!(cov.requirement_coverage, 100.0);

    let found = gaps::detect_gaps(&fx.store, PROJECT).expect("gaps");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].gap_type, GAP_CODE_WITHOUT_TEST);
    assert_eq!(
        (found[0].source.entity_id.as_str(), found[0].target.entity_id.as_str()),
        ("M1", "src/nav_controller.rs")
    );

    let orphan_report = orphans::find_orphans(&fx.store, PROJECT).expect("orphans");
    assert_eq!(orphan_report.code_without_tests.len(), 1);

    let integrity_report = integrity::validate_integrity(&fx.store, PROJECT).expect("validate");
    assert!(integrity_report.valid);
    assert_eq!(integrity_report.links_checked, 3);
}

#[test]
fn report_collects_every_section() {
    let fx = fixture();
    let chain = seed_full_chain(&fx);
    links::delete_link(&fx.store, PROJECT, &chain.code_control, ACTOR).expect("delete");
    fx.requirement("R2", "REQ-002", "Loiter | hold");

    let rep = report::generate_report(&fx.store, PROJECT).expect("report");
    assert_eq!(rep.project_id, PROJECT);
    assert_eq!(rep.stats.total, 3);
    assert_eq!(rep.requirements.len(), 2);
    assert!(rep.requirements.iter().all(|r| !r.complete));
    assert_eq!(rep.orphans.requirements_without_model.len(), 1);
    assert_eq!(rep.gaps.len(), 1);
    assert!(rep.integrity.valid);

    assert_eq!(
        rep.coverage.counts.requirements_complete,
        rep.requirements.iter().filter(|r| r.complete).count()
    );
    assert_eq!(rep.coverage.counts.requirements_total, rep.requirements.len());

    let bare = rep.to_markdown(None);
    assert!(bare.starts_with("# Digital Thread Report: P1"));
    assert!(!bare.contains("CUI // SP-CTI"));

    let md = rep.to_markdown(Some("CUI // SP-CTI"));
    assert!(md.starts_with("CUI // SP-CTI\n"));
    assert!(md.trim_end().ends_with("CUI // SP-CTI"));
    for heading in ["## Links", "## Coverage", "## Orphans", "## Gaps (1)", "## Integrity"] {
        assert!(md.contains(heading), "missing {heading}");
    }
    assert!(md.contains("Loiter \\| hold"), "pipes in cells are escaped");

    let json = serde_json::to_value(&rep).expect("json");
    assert_eq!(json["coverage"]["requirement_coverage"], 50.0);
    assert!(json["integrity"]["findings"].as_array().expect("findings").is_empty());
}
