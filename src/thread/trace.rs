//! Forward/backward traversal of the thread into a tree.
//!
//! Breadth-first from the origin. Every matching link becomes a tree node under
//! the node it was reached from, so an entity reachable along several paths
//! shows up once per path. Only its first discovery is expanded further; later
//! occurrences are leaves. Nodes at `max_depth` hops are never expanded.
//!
//! `max_depth` is capped at [`MAX_TRACE_DEPTH`]: the tree is nested, so its
//! drop, clone and serialization all recurse once per hop.

use crate::core::error::ThreadError;
use crate::core::store::Store;
use crate::thread::links;
use crate::thread::resolver::NameResolver;
use rusqlite::Connection;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Deepest trace accepted. Larger requests are rejected, not truncated.
pub const MAX_TRACE_DEPTH: u32 = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Forward,
    Backward,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceNode {
    pub link_id: String,
    pub link_type: String,
    pub confidence: f64,
    pub entity_type: String,
    pub entity_id: String,
    pub label: String,
    pub children: Vec<TraceNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceOrigin {
    pub entity_type: String,
    pub entity_id: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceTree {
    pub project_id: String,
    pub direction: Direction,
    pub origin: TraceOrigin,
    pub max_depth: u32,
    /// Tree nodes, counting repeated occurrences.
    pub node_count: usize,
    /// Distinct entities reached, excluding the origin.
    pub entity_count: usize,
    pub children: Vec<TraceNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullThread {
    pub project_id: String,
    pub origin: TraceOrigin,
    pub forward: Vec<TraceNode>,
    pub backward: Vec<TraceNode>,
}

impl TraceNode {
    /// Every node in this subtree, depth first, including `self`.
    pub fn walk(&self) -> Vec<&TraceNode> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(node.children.iter().rev());
        }
        out
    }
}

impl TraceTree {
    pub fn nodes(&self) -> Vec<&TraceNode> {
        self.children.iter().flat_map(|c| c.walk()).collect()
    }

    /// Height of the tree in hops from the origin.
    pub fn depth(&self) -> u32 {
        let mut deepest = 0;
        let mut stack: Vec<(&TraceNode, u32)> = self.children.iter().map(|c| (c, 1)).collect();
        while let Some((node, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            stack.extend(node.children.iter().map(|c| (c, depth + 1)));
        }
        deepest
    }
}

struct Slot {
    node: Option<TraceNode>,
    children: Vec<usize>,
}

pub(crate) fn trace_conn(
    conn: &Connection,
    project_id: &str,
    direction: Direction,
    origin_type: &str,
    origin_id: &str,
    max_depth: u32,
) -> Result<TraceTree, ThreadError> {
    if max_depth > MAX_TRACE_DEPTH {
        return Err(ThreadError::Validation(format!(
            "max depth {} exceeds the limit of {}",
            max_depth, MAX_TRACE_DEPTH
        )));
    }
    let mut resolver = NameResolver::new(conn);
    let origin = TraceOrigin {
        entity_type: origin_type.to_string(),
        entity_id: origin_id.to_string(),
        label: resolver.resolve(origin_type, origin_id),
    };

    // Slot 0 is the origin; its node is never materialized.
    let mut slots = vec![Slot {
        node: None,
        children: Vec::new(),
    }];
    let mut seen: FxHashSet<(String, String)> = FxHashSet::default();
    seen.insert((origin_type.to_string(), origin_id.to_string()));

    let mut queue: VecDeque<(usize, String, String, u32)> = VecDeque::new();
    queue.push_back((0, origin_type.to_string(), origin_id.to_string(), 0));

    while let Some((parent, entity_type, entity_id, depth)) = queue.pop_front() {
        if depth >= max_depth {
            continue;
        }
        let hops = match direction {
            Direction::Forward => links::outgoing(conn, project_id, &entity_type, &entity_id)?,
            Direction::Backward => links::incoming(conn, project_id, &entity_type, &entity_id)?,
        };

        for link in hops {
            let (next_type, next_id) = match direction {
                Direction::Forward => (link.target_type, link.target_id),
                Direction::Backward => (link.source_type, link.source_id),
            };
            let label = resolver.resolve(&next_type, &next_id);
            let idx = slots.len();
            slots.push(Slot {
                node: Some(TraceNode {
                    link_id: link.id,
                    link_type: link.link_type,
                    confidence: link.confidence,
                    entity_type: next_type.clone(),
                    entity_id: next_id.clone(),
                    label,
                    children: Vec::new(),
                }),
                children: Vec::new(),
            });
            slots[parent].children.push(idx);

            if seen.insert((next_type.clone(), next_id.clone())) {
                queue.push_back((idx, next_type, next_id, depth + 1));
            }
        }
    }

    let node_count = slots.len() - 1;
    let entity_count = seen.len() - 1;

    // Children always sit at higher indices than their parent, so a reverse
    // sweep finalizes every subtree before its parent collects it.
    let mut root_children = Vec::new();
    for i in (0..slots.len()).rev() {
        let child_ids = std::mem::take(&mut slots[i].children);
        let kids: Vec<TraceNode> = child_ids
            .iter()
            .filter_map(|&c| slots[c].node.take())
            .collect();
        match slots[i].node.as_mut() {
            Some(node) => node.children = kids,
            None => root_children = kids,
        }
    }

    Ok(TraceTree {
        project_id: project_id.to_string(),
        direction,
        origin,
        max_depth,
        node_count,
        entity_count,
        children: root_children,
    })
}

pub fn trace_forward(
    store: &Store,
    project_id: &str,
    source_type: &str,
    source_id: &str,
    max_depth: u32,
) -> Result<TraceTree, ThreadError> {
    store.with_read(|conn| {
        trace_conn(conn, project_id, Direction::Forward, source_type, source_id, max_depth)
    })
}

pub fn trace_backward(
    store: &Store,
    project_id: &str,
    target_type: &str,
    target_id: &str,
    max_depth: u32,
) -> Result<TraceTree, ThreadError> {
    store.with_read(|conn| {
        trace_conn(conn, project_id, Direction::Backward, target_type, target_id, max_depth)
    })
}

/// Both traversals from the same origin, read on one connection.
pub fn full_thread(
    store: &Store,
    project_id: &str,
    entity_type: &str,
    entity_id: &str,
    max_depth: u32,
) -> Result<FullThread, ThreadError> {
    store.with_read(|conn| {
        let forward =
            trace_conn(conn, project_id, Direction::Forward, entity_type, entity_id, max_depth)?;
        let backward =
            trace_conn(conn, project_id, Direction::Backward, entity_type, entity_id, max_depth)?;
        Ok(FullThread {
            project_id: project_id.to_string(),
            origin: forward.origin,
            forward: forward.children,
            backward: backward.children,
        })
    })
}
