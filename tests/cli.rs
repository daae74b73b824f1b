use std::path::Path;
use std::process::{Command, Output};
use tempfile::tempdir;

fn run_dthread(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_dthread"))
        .args(args)
        .current_dir(dir)
        .env("NO_COLOR", "1")
        .env_remove("DTHREAD_DB")
        .env_remove("DTHREAD_ACTOR")
        .env_remove("DTHREAD_AUDIT_LOG")
        .env_remove("DTHREAD_LOG")
        .output()
        .expect("run dthread")
}

fn link(dir: &Path, source: (&str, &str), target: (&str, &str), link_type: &str) -> String {
    let out = run_dthread(
        dir,
        &[
            "--project-id",
            "P1",
            "--json",
            "create-link",
            "--source-type",
            source.0,
            "--source-id",
            source.1,
            "--target-type",
            target.0,
            "--target-id",
            target.1,
            "--link-type",
            link_type,
        ],
    );
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let body: serde_json::Value = serde_json::from_slice(&out.stdout).expect("json stdout");
    body["link_id"].as_str().expect("link_id").to_string()
}

#[test]
fn init_creates_workspace_and_config() {
    let tmp = tempdir().expect("tempdir");
    let out = run_dthread(tmp.path(), &["init", "--with-external-tables"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let config = std::fs::read_to_string(tmp.path().join(".dthread/config.toml")).expect("config");
    assert!(config.contains("keyword_policy = \"merge\""));
    assert!(tmp.path().join(".dthread/thread.db").exists());

    let stdout = String::from_utf8_lossy(&out.stdout);
    assert_eq!(stdout.matches("CUI // SP-CTI").count(), 2, "banner before and after: {stdout}");
}

#[test]
fn json_output_keeps_stdout_parseable_and_audits_writes() {
    let tmp = tempdir().expect("tempdir");
    assert!(run_dthread(tmp.path(), &["init"]).status.success());

    let id = link(tmp.path(), ("code_module", "src/a.rs"), ("test_file", "tests/a.rs"), "verifies");
    assert!(id.starts_with("DL_"));

    let out = run_dthread(tmp.path(), &["--project-id", "P1", "--json", "get-link", "--link-id", &id]);
    assert!(out.status.success());
    let body: serde_json::Value = serde_json::from_slice(&out.stdout).expect("json stdout");
    assert_eq!(body["target_id"], "tests/a.rs");
    assert!(String::from_utf8_lossy(&out.stderr).contains("CUI // SP-CTI"));

    let audit = std::fs::read_to_string(tmp.path().join(".dthread/audit.events.jsonl")).expect("audit");
    assert_eq!(audit.lines().count(), 1);
}

#[test]
fn validate_exits_non_zero_on_cycle() {
    let tmp = tempdir().expect("tempdir");
    assert!(run_dthread(tmp.path(), &["init"]).status.success());

    link(tmp.path(), ("sysml_element", "A"), ("sysml_element", "B"), "refines");
    let ok = run_dthread(tmp.path(), &["--project-id", "P1", "validate"]);
    assert!(ok.status.success(), "{}", String::from_utf8_lossy(&ok.stderr));

    link(tmp.path(), ("sysml_element", "B"), ("sysml_element", "A"), "refines");
    let bad = run_dthread(tmp.path(), &["--project-id", "P1", "validate"]);
    assert!(!bad.status.success());
    assert!(String::from_utf8_lossy(&bad.stdout).contains("cycle"));
}

#[test]
fn engine_commands_require_project_id() {
    let tmp = tempdir().expect("tempdir");
    let out = run_dthread(tmp.path(), &["coverage"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("--project-id"));
}

#[test]
fn report_writes_markdown_file() {
    let tmp = tempdir().expect("tempdir");
    assert!(run_dthread(tmp.path(), &["init", "--with-external-tables"]).status.success());
    link(tmp.path(), ("doors_requirement", "R1"), ("sysml_element", "M1"), "satisfies");

    let out = run_dthread(
        tmp.path(),
        &["--project-id", "P1", "report", "--output", "out/thread.md"],
    );
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let md = std::fs::read_to_string(tmp.path().join("out/thread.md")).expect("report file");
    assert!(md.starts_with("CUI // SP-CTI"));
    assert!(md.contains("# Digital Thread Report: P1"));
}

#[test]
fn report_on_stdout_is_framed_once() {
    let tmp = tempdir().expect("tempdir");
    assert!(run_dthread(tmp.path(), &["init", "--with-external-tables"]).status.success());
    link(tmp.path(), ("doors_requirement", "R1"), ("sysml_element", "M1"), "satisfies");

    let out = run_dthread(tmp.path(), &["--project-id", "P1", "report"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert_eq!(stdout.matches("CUI // SP-CTI").count(), 2, "{stdout}");
    assert!(stdout.contains("# Digital Thread Report: P1"));
}
