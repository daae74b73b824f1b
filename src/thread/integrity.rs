//! Integrity validation of a project's links.
//!
//! Four checks run over every link of the project:
//! 1. type validity (`error`)
//! 2. dangling references into the external lookup tables (`warning`)
//! 3. edges that close a cycle (`warning`)
//! 4. duplicate link tuples (`info`)
//!
//! `valid` is false on any `error` finding or any cycle.

use crate::core::error::ThreadError;
use crate::core::store::Store;
use crate::thread::external;
use crate::thread::links;
use crate::thread::types::{EntityType, Link, LinkType};
use rusqlite::Connection;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const CHECK_TYPE_VALIDITY: &str = "type_validity";
pub const CHECK_DANGLING_REFERENCE: &str = "dangling_reference";
pub const CHECK_CYCLE: &str = "cycle";
pub const CHECK_DUPLICATE: &str = "duplicate";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub check: String,
    pub severity: Severity,
    pub message: String,
    pub link_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub project_id: String,
    pub valid: bool,
    pub links_checked: usize,
    pub errors: usize,
    pub warnings: usize,
    pub infos: usize,
    pub findings: Vec<Finding>,
}

impl IntegrityReport {
    pub fn by_check(&self, check: &str) -> Vec<&Finding> {
        self.findings.iter().filter(|f| f.check == check).collect()
    }
}

fn check_types(links: &[Link], findings: &mut Vec<Finding>) {
    for link in links {
        let mut problems = Vec::new();
        if EntityType::parse(&link.source_type).is_err() {
            problems.push(format!("source_type '{}'", link.source_type));
        }
        if EntityType::parse(&link.target_type).is_err() {
            problems.push(format!("target_type '{}'", link.target_type));
        }
        if LinkType::parse(&link.link_type).is_err() {
            problems.push(format!("link_type '{}'", link.link_type));
        }
        if !problems.is_empty() {
            findings.push(Finding {
                check: CHECK_TYPE_VALIDITY.to_string(),
                severity: Severity::Error,
                message: format!("Link {} has invalid {}", link.id, problems.join(", ")),
                link_ids: vec![link.id.clone()],
            });
        }
    }
}

fn check_dangling(
    conn: &Connection,
    links: &[Link],
    findings: &mut Vec<Finding>,
) -> Result<(), ThreadError> {
    // (table, id) -> exists; None when the table itself is absent
    let mut cache: FxHashMap<(&'static str, String), Option<bool>> = FxHashMap::default();

    for link in links {
        for (role, entity_type, entity_id) in [
            ("source", &link.source_type, &link.source_id),
            ("target", &link.target_type, &link.target_id),
        ] {
            let Ok(kind) = EntityType::parse(entity_type) else {
                continue;
            };
            let Some((table, _)) = kind.lookup_table() else {
                continue;
            };
            let key = (table, entity_id.clone());
            let exists = match cache.get(&key).copied() {
                Some(hit) => hit,
                None => {
                    let found = external::row_exists(conn, table, entity_id)?;
                    cache.insert(key, found);
                    found
                }
            };
            if exists == Some(false) {
                findings.push(Finding {
                    check: CHECK_DANGLING_REFERENCE.to_string(),
                    severity: Severity::Warning,
                    message: format!(
                        "Link {} {} {}:{} not found in {}",
                        link.id, role, entity_type, entity_id, table
                    ),
                    link_ids: vec![link.id.clone()],
                });
            }
        }
    }
    Ok(())
}

pub type NodeKey<'a> = (&'a str, &'a str);

/// Indices of edges whose target is on the DFS stack when the edge is walked.
///
/// Iterative depth-first search; the explicit stack stands in for recursion so
/// long chains cannot exhaust the thread stack. Roots and neighbors are visited
/// in first-appearance order of `edges`.
pub fn cycle_edges<'a>(edges: &[(NodeKey<'a>, NodeKey<'a>)]) -> Vec<usize> {
    let mut adj: FxHashMap<NodeKey<'a>, Vec<usize>> = FxHashMap::default();
    let mut order: Vec<NodeKey<'a>> = Vec::new();
    let mut known: FxHashSet<NodeKey<'a>> = FxHashSet::default();
    for (i, (from, to)) in edges.iter().enumerate() {
        adj.entry(*from).or_default().push(i);
        for node in [*from, *to] {
            if known.insert(node) {
                order.push(node);
            }
        }
    }

    let mut flagged = Vec::new();
    let mut visited: FxHashSet<NodeKey<'a>> = FxHashSet::default();
    let mut on_stack: FxHashSet<NodeKey<'a>> = FxHashSet::default();

    for start in order {
        if visited.contains(&start) {
            continue;
        }
        visited.insert(start);
        on_stack.insert(start);
        let mut stack: Vec<(NodeKey<'a>, usize)> = vec![(start, 0)];

        while let Some(frame) = stack.last_mut() {
            let node = frame.0;
            let out = adj.get(&node).map(Vec::as_slice).unwrap_or(&[]);
            if frame.1 < out.len() {
                let edge_idx = out[frame.1];
                frame.1 += 1;
                let next = edges[edge_idx].1;
                if on_stack.contains(&next) {
                    flagged.push(edge_idx);
                } else if visited.insert(next) {
                    on_stack.insert(next);
                    stack.push((next, 0));
                }
            } else {
                on_stack.remove(&node);
                stack.pop();
            }
        }
    }

    flagged
}

fn check_cycles(links: &[Link], findings: &mut Vec<Finding>) {
    let edges: Vec<(NodeKey<'_>, NodeKey<'_>)> = links
        .iter()
        .map(|l| {
            (
                (l.source_type.as_str(), l.source_id.as_str()),
                (l.target_type.as_str(), l.target_id.as_str()),
            )
        })
        .collect();

    for idx in cycle_edges(&edges) {
        let link = &links[idx];
        findings.push(Finding {
            check: CHECK_CYCLE.to_string(),
            severity: Severity::Warning,
            message: format!(
                "Link {} ({}:{} -> {}:{}) closes a cycle",
                link.id, link.source_type, link.source_id, link.target_type, link.target_id
            ),
            link_ids: vec![link.id.clone()],
        });
    }
}

fn check_duplicates(links: &[Link], findings: &mut Vec<Finding>) {
    let mut groups: BTreeMap<(&str, &str, &str, &str, &str), Vec<&str>> = BTreeMap::new();
    for link in links {
        groups
            .entry((
                link.source_type.as_str(),
                link.source_id.as_str(),
                link.target_type.as_str(),
                link.target_id.as_str(),
                link.link_type.as_str(),
            ))
            .or_default()
            .push(link.id.as_str());
    }

    for ((st, sid, tt, tid, lt), ids) in groups {
        if ids.len() > 1 {
            tracing::warn!(
                count = ids.len(),
                "duplicate link tuple present; uniqueness index was bypassed"
            );
            findings.push(Finding {
                check: CHECK_DUPLICATE.to_string(),
                severity: Severity::Info,
                message: format!(
                    "{} links share {}:{} --[{}]--> {}:{}",
                    ids.len(),
                    st,
                    sid,
                    lt,
                    tt,
                    tid
                ),
                link_ids: ids.into_iter().map(str::to_string).collect(),
            });
        }
    }
}

pub(crate) fn validate_conn(conn: &Connection, project_id: &str) -> Result<IntegrityReport, ThreadError> {
    let links = links::all_links(conn, project_id)?;
    let mut findings = Vec::new();

    check_types(&links, &mut findings);
    check_dangling(conn, &links, &mut findings)?;
    check_cycles(&links, &mut findings);
    check_duplicates(&links, &mut findings);

    let count = |s: Severity| findings.iter().filter(|f| f.severity == s).count();
    let errors = count(Severity::Error);
    let warnings = count(Severity::Warning);
    let infos = count(Severity::Info);
    let has_cycle = findings.iter().any(|f| f.check == CHECK_CYCLE);

    Ok(IntegrityReport {
        project_id: project_id.to_string(),
        valid: errors == 0 && !has_cycle,
        links_checked: links.len(),
        errors,
        warnings,
        infos,
        findings,
    })
}

pub fn validate_integrity(store: &Store, project_id: &str) -> Result<IntegrityReport, ThreadError> {
    store.with_read(|conn| validate_conn(conn, project_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn e<'a>(a: &'a str, b: &'a str) -> (NodeKey<'a>, NodeKey<'a>) {
        (("n", a), ("n", b))
    }

    #[test]
    fn test_three_node_cycle_flags_closing_edge() {
        let edges = vec![e("a", "b"), e("b", "c"), e("c", "a")];
        assert_eq!(cycle_edges(&edges), vec![2]);
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let edges = vec![e("a", "b"), e("a", "c"), e("b", "d"), e("c", "d")];
        assert!(cycle_edges(&edges).is_empty());
    }

    #[test]
    fn test_self_loop_is_flagged() {
        let edges = vec![e("a", "a")];
        assert_eq!(cycle_edges(&edges), vec![0]);
    }

    #[test]
    fn test_long_chain_does_not_overflow() {
        let ids: Vec<String> = (0..200_000).map(|i| i.to_string()).collect();
        let mut edges: Vec<(NodeKey<'_>, NodeKey<'_>)> = ids
            .windows(2)
            .map(|w| (("n", w[0].as_str()), ("n", w[1].as_str())))
            .collect();
        edges.push((("n", ids[ids.len() - 1].as_str()), ("n", ids[0].as_str())));
        assert_eq!(cycle_edges(&edges), vec![edges.len() - 1]);
    }

    #[test]
    fn test_same_id_different_type_are_distinct_nodes() {
        let edges = vec![
            (("code_module", "x"), ("test_file", "x")),
            (("test_file", "x"), ("nist_control", "AC-2")),
        ];
        assert!(cycle_edges(&edges).is_empty());
    }
}
