//! Heuristic link synthesis.
//!
//! Two independent passes, each tagging what it creates with a fixed evidence
//! string and confidence so inferred links stay distinguishable from asserted
//! ones:
//!
//! - **name match** (0.7): model element names against code file stems, and
//!   requirement identifiers embedded in code/test file names.
//! - **keyword match** (0.6): control-family keywords found in a model
//!   element's name, stereotype, or description.
//!
//! Neither pass overwrites a link that already exists on the same tuple.

use crate::core::audit::{self, AuditEvent};
use crate::core::config::KeywordPolicy;
use crate::core::error::ThreadError;
use crate::core::store::Store;
use crate::thread::external::{self, CodeArtifact, ModelElement};
use crate::thread::links;
use crate::thread::types::{
    CONFIDENCE_KEYWORD_MATCH, CONFIDENCE_NAME_MATCH, EVIDENCE_KEYWORD_MATCH, EVIDENCE_NAME_MATCH,
    EntityType, LinkType, NewLink,
};
use rayon::prelude::*;
use regex::Regex;
use rusqlite::Connection;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;

pub const EVENT_AUTO_LINKED: &str = "digital_thread.auto_linked";

/// Requirement identifiers shorter than this (after normalization) are too
/// ambiguous to search for inside file names.
const MIN_REQ_ID_LEN: usize = 3;

/// Control family keyword table, in declaration order.
///
/// `AC` is declared twice. How the two lists combine is governed by
/// [`KeywordPolicy`]; see [`keyword_table`].
pub const CONTROL_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "AC",
        &["access control", "authorization", "authorize", "permission", "rbac", "role"],
    ),
    ("AU", &["audit", "logging", "logger", "accountability", "event log"]),
    (
        "SC",
        &["encrypt", "tls", "cryptograph", "transmission", "boundary", "firewall"],
    ),
    (
        "IA",
        &["authenticat", "identity", "credential", "password", "mfa", "pki"],
    ),
    ("CM", &["configuration", "baseline", "change control", "inventory"]),
    (
        "SI",
        &["integrity", "input validation", "sanitiz", "malware", "patch", "error handling"],
    ),
    (
        "AC",
        &["session", "lockout", "account management", "least privilege", "separation of duties"],
    ),
];

static CAMEL_LOWER_UPPER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([a-z0-9])([A-Z])").unwrap());
static CAMEL_ACRONYM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Z]+)([A-Z][a-z])").unwrap());
static NON_ALNUM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^A-Za-z0-9]+").unwrap());

/// One pattern per keyword. A keyword must start a word but may run on, so
/// `encrypt` finds `encryption` while `patch` stays out of `dispatch`.
static KEYWORD_PATTERNS: LazyLock<FxHashMap<&'static str, Regex>> = LazyLock::new(|| {
    CONTROL_KEYWORDS
        .iter()
        .flat_map(|(_, keywords)| keywords.iter())
        .map(|kw| (*kw, Regex::new(&format!(r"\b{}", regex::escape(kw))).unwrap()))
        .collect()
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoLinkedLink {
    pub link_id: String,
    pub source_type: String,
    pub source_id: String,
    pub target_type: String,
    pub target_id: String,
    pub link_type: String,
    /// What triggered the match (stem, requirement id, or keyword).
    pub matched_on: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoLinkSummary {
    pub project_id: String,
    pub strategy: String,
    pub created: usize,
    pub skipped: usize,
    pub links: Vec<AutoLinkedLink>,
}

/// `FlightController` / `HTTPServer` / `nav data` -> `flight_controller` / `http_server` / `nav_data`.
pub fn to_snake_case(name: &str) -> String {
    let s = CAMEL_ACRONYM.replace_all(name, "${1}_${2}");
    let s = CAMEL_LOWER_UPPER.replace_all(&s, "${1}_${2}");
    let s = NON_ALNUM.replace_all(&s, "_");
    s.trim_matches('_').to_lowercase()
}

/// Lowercase with every non-alphanumeric character removed.
pub fn flatten_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

/// Lowercase with hyphens, underscores, and spaces removed: `REQ-001` -> `req001`.
pub fn normalize_req_id(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, '-' | '_' | ' '))
        .collect::<String>()
        .to_lowercase()
}

/// Lowercase words separated by single spaces; camelCase is split.
fn words(text: &str) -> String {
    to_snake_case(text).replace('_', " ")
}

fn keyword_hit(text: &str, keyword: &str) -> bool {
    KEYWORD_PATTERNS
        .get(keyword)
        .is_some_and(|re| re.is_match(text))
}

/// Whether the normalized requirement id `needle` is spelled out by a run of
/// whole tokens in `file`: `test_REQ_001.rs` holds `req001`, `req0010.rs` does not.
fn contains_req_id(file: &str, needle: &str) -> bool {
    let snake = to_snake_case(file);
    let tokens: Vec<&str> = snake.split('_').filter(|t| !t.is_empty()).collect();
    (0..tokens.len()).any(|start| {
        let mut joined = String::new();
        for token in &tokens[start..] {
            joined.push_str(token);
            if joined.len() >= needle.len() {
                return joined == needle;
            }
        }
        false
    })
}

fn file_stem(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

fn file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string())
}

/// Keyword lists per family, ordered by first declaration.
pub fn keyword_table(policy: KeywordPolicy) -> Vec<(&'static str, Vec<&'static str>)> {
    let mut table: Vec<(&'static str, Vec<&'static str>)> = Vec::new();
    for (family, keywords) in CONTROL_KEYWORDS {
        match table.iter_mut().find(|(f, _)| f == family) {
            Some((_, existing)) => match policy {
                KeywordPolicy::Merge => {
                    for kw in keywords.iter() {
                        if !existing.contains(kw) {
                            existing.push(*kw);
                        }
                    }
                }
                KeywordPolicy::LastWins => *existing = keywords.to_vec(),
            },
            None => table.push((*family, keywords.to_vec())),
        }
    }
    table
}

fn control_family(control_id: &str) -> String {
    control_id
        .split('-')
        .next()
        .unwrap_or_default()
        .trim()
        .to_uppercase()
}

/// A candidate produced by a heuristic, before persistence.
struct Candidate {
    source: (EntityType, String),
    target: (EntityType, String),
    link_type: LinkType,
    matched_on: String,
}

fn name_match_candidates(
    elements: &[ModelElement],
    artifacts: &[CodeArtifact],
    requirements: &[external::Requirement],
) -> Vec<Candidate> {
    let mut out: Vec<Candidate> = elements
        .par_iter()
        .flat_map_iter(|element| {
            let snake = to_snake_case(&element.name);
            let flat = flatten_name(&element.name);
            artifacts
                .iter()
                .filter(|a| !a.is_test())
                .filter_map(move |artifact| {
                    if flat.is_empty() {
                        return None;
                    }
                    let stem = file_stem(&artifact.code_path);
                    (stem == snake || flatten_name(&stem) == flat).then(|| Candidate {
                        source: (EntityType::SysmlElement, element.id.clone()),
                        target: (EntityType::CodeModule, artifact.code_path.clone()),
                        link_type: LinkType::Implements,
                        matched_on: stem,
                    })
                })
                .collect::<Vec<_>>()
        })
        .collect();

    let by_req_id: Vec<Candidate> = artifacts
        .par_iter()
        .flat_map_iter(|artifact| {
            let name = file_name(&artifact.code_path);
            requirements
                .iter()
                .filter(|req| {
                    let needle = normalize_req_id(&req.requirement_id);
                    needle.len() >= MIN_REQ_ID_LEN && contains_req_id(&name, &needle)
                })
                .map(|req| {
                    let (source_type, link_type) = if artifact.is_test() {
                        (EntityType::TestFile, LinkType::Verifies)
                    } else {
                        (EntityType::CodeModule, LinkType::Implements)
                    };
                    Candidate {
                        source: (source_type, artifact.code_path.clone()),
                        target: (EntityType::DoorsRequirement, req.id.clone()),
                        link_type,
                        matched_on: req.requirement_id.clone(),
                    }
                })
                .collect::<Vec<_>>()
        })
        .collect();

    out.extend(by_req_id);
    out
}

fn keyword_candidates(
    elements: &[ModelElement],
    controls: &[String],
    policy: KeywordPolicy,
) -> Vec<Candidate> {
    let table = keyword_table(policy);

    elements
        .par_iter()
        .flat_map_iter(|element| {
            let text = [
                Some(element.name.as_str()),
                element.stereotype.as_deref(),
                element.description.as_deref(),
            ]
            .into_iter()
            .flatten()
            .map(words)
            .collect::<Vec<_>>()
            .join(" ");

            let mut found = Vec::new();
            for (family, keywords) in &table {
                let Some(hit) = keywords.iter().find(|kw| keyword_hit(&text, kw)) else {
                    continue;
                };
                for control in controls.iter().filter(|c| control_family(c) == *family) {
                    found.push(Candidate {
                        source: (EntityType::SysmlElement, element.id.clone()),
                        target: (EntityType::NistControl, control.clone()),
                        link_type: LinkType::Satisfies,
                        matched_on: (*hit).to_string(),
                    });
                }
            }
            found
        })
        .collect()
}

fn persist_candidates(
    conn: &Connection,
    project_id: &str,
    strategy: &str,
    candidates: &[Candidate],
    evidence: &str,
    confidence: f64,
    actor: &str,
) -> Result<AutoLinkSummary, ThreadError> {
    let mut summary = AutoLinkSummary {
        project_id: project_id.to_string(),
        strategy: strategy.to_string(),
        created: 0,
        skipped: 0,
        links: Vec::new(),
    };

    for c in candidates {
        let link = NewLink {
            project_id,
            source_type: c.source.0.as_str(),
            source_id: &c.source.1,
            target_type: c.target.0.as_str(),
            target_id: &c.target.1,
            link_type: c.link_type.as_str(),
            evidence: Some(evidence),
            confidence,
            actor,
        };
        if links::link_exists(conn, &link)? {
            summary.skipped += 1;
            continue;
        }
        let link_id = links::replace_link(conn, &link)?;
        summary.created += 1;
        summary.links.push(AutoLinkedLink {
            link_id,
            source_type: link.source_type.to_string(),
            source_id: link.source_id.to_string(),
            target_type: link.target_type.to_string(),
            target_id: link.target_id.to_string(),
            link_type: link.link_type.to_string(),
            matched_on: c.matched_on.clone(),
        });
    }

    Ok(summary)
}

fn emit_summary(store: &Store, actor: &str, summary: &AutoLinkSummary) {
    tracing::info!(
        project_id = %summary.project_id,
        strategy = %summary.strategy,
        created = summary.created,
        skipped = summary.skipped,
        "auto-link pass finished"
    );
    audit::emit_best_effort(
        store.audit(),
        AuditEvent::new(
            EVENT_AUTO_LINKED,
            actor,
            format!(
                "Auto-linked {} ({} created, {} skipped)",
                summary.strategy, summary.created, summary.skipped
            ),
            &summary.project_id,
            serde_json::json!({
                "strategy": summary.strategy,
                "created": summary.created,
                "skipped": summary.skipped,
                "link_ids": summary.links.iter().map(|l| l.link_id.as_str()).collect::<Vec<_>>(),
            }),
        ),
    );
}

/// Name-based pass. Runs in a single transaction.
pub fn auto_link_by_name(
    store: &Store,
    project_id: &str,
    actor: &str,
) -> Result<AutoLinkSummary, ThreadError> {
    let summary = store.with_write(|conn| {
        let elements = external::model_elements(conn, project_id, None)?;
        let artifacts = external::code_artifacts(conn, project_id)?;
        let requirements = external::requirements(conn, project_id)?;
        let candidates = name_match_candidates(&elements, &artifacts, &requirements);
        persist_candidates(
            conn,
            project_id,
            "name_match",
            &candidates,
            EVIDENCE_NAME_MATCH,
            CONFIDENCE_NAME_MATCH,
            actor,
        )
    })?;
    emit_summary(store, actor, &summary);
    Ok(summary)
}

/// Keyword-to-control pass. Runs in a single transaction.
pub fn auto_link_controls(
    store: &Store,
    project_id: &str,
    policy: KeywordPolicy,
    actor: &str,
) -> Result<AutoLinkSummary, ThreadError> {
    let summary = store.with_write(|conn| {
        let elements = external::model_elements(conn, project_id, None)?;
        let controls = external::project_controls(conn, project_id)?;
        let candidates = keyword_candidates(&elements, &controls, policy);
        persist_candidates(
            conn,
            project_id,
            "keyword_match",
            &candidates,
            EVIDENCE_KEYWORD_MATCH,
            CONFIDENCE_KEYWORD_MATCH,
            actor,
        )
    })?;
    emit_summary(store, actor, &summary);
    Ok(summary)
}
