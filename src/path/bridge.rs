//! Multi-anchor bridge pathfinding
//!
//! Builds an undirected adjacency view of the current snapshot (excluding
//! proxy and no-connection edges), runs unweighted BFS per consecutive
//! anchor pair, and chains the per-pair paths. When a pair cannot be
//! connected, falls back to the single best-connecting pair across all
//! pairs; proxy edges are admitted only as a last resort.

use super::anchor::Anchor;
use crate::config::DiscoveryConfig;
use crate::graph::{EdgeKey, EdgeStatus, EntityKey, GraphSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

/// The connecting mechanism path between the question's anchors.
///
/// A fresh value is produced on every recomputation; consumers compare
/// signatures to decide whether anything actually changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgePath {
    /// Node keys along the path, in walk order
    pub nodes: Vec<EntityKey>,
    /// Edge keys connecting consecutive nodes
    pub edges: Vec<EdgeKey>,
    /// True when every consecutive anchor pair connects through real evidence
    pub connected_across_anchors: bool,
    /// Anchor pairs (by label) that could not be connected
    pub unresolved_pairs: Vec<(String, String)>,
}

impl BridgePath {
    /// Order-independent identity of this path value.
    pub fn signature(&self) -> String {
        let mut node_ids: Vec<&str> = self.nodes.iter().map(EntityKey::as_str).collect();
        node_ids.sort_unstable();
        let mut edge_ids: Vec<String> = self.edges.iter().map(EdgeKey::to_string).collect();
        edge_ids.sort_unstable();
        format!(
            "{}/{}|{}",
            self.connected_across_anchors,
            node_ids.join(","),
            edge_ids.join(",")
        )
    }
}

type Adjacency = HashMap<EntityKey, Vec<(EntityKey, EdgeKey)>>;

/// Compute the best bridge path for the given anchors against a snapshot.
///
/// Returns `None` when fewer than two anchors resolve to nodes: there is no
/// path to compute yet.
pub fn resolve_path(
    snapshot: &GraphSnapshot,
    anchors: &[Anchor],
    config: &DiscoveryConfig,
) -> Option<BridgePath> {
    let resolved: Vec<(String, Option<EntityKey>)> = anchors
        .iter()
        .map(|a| (a.label().to_string(), a.resolve(snapshot, config.similarity_floor)))
        .collect();

    let resolved_count = resolved.iter().filter(|(_, k)| k.is_some()).count();
    if resolved_count < 2 {
        return None;
    }

    let adj = build_adjacency(snapshot, false);

    // Consecutive-pair chaining
    let mut segments: Vec<(Vec<EntityKey>, Vec<EdgeKey>)> = Vec::new();
    let mut all_connected = true;
    for pair in resolved.windows(2) {
        match (&pair[0].1, &pair[1].1) {
            (Some(a), Some(b)) => match bfs(&adj, a, b) {
                Some(segment) => segments.push(segment),
                None => all_connected = false,
            },
            _ => all_connected = false,
        }
    }

    if all_connected && !segments.is_empty() {
        let (nodes, edges) = concatenate(segments);
        return Some(BridgePath {
            nodes,
            edges,
            connected_across_anchors: true,
            unresolved_pairs: Vec::new(),
        });
    }

    // Fallback: best-connecting pair across all anchor pairs, preferring the
    // path with the most edges, then the fewest nodes.
    let mut unresolved_pairs: Vec<(String, String)> = Vec::new();
    let mut best: Option<(Vec<EntityKey>, Vec<EdgeKey>)> = None;
    for i in 0..resolved.len() {
        for j in (i + 1)..resolved.len() {
            let found = match (&resolved[i].1, &resolved[j].1) {
                (Some(a), Some(b)) => bfs(&adj, a, b),
                _ => None,
            };
            match found {
                Some((nodes, edges)) => {
                    let better = match &best {
                        None => true,
                        Some((bn, be)) => {
                            edges.len() > be.len()
                                || (edges.len() == be.len() && nodes.len() < bn.len())
                        }
                    };
                    if better {
                        best = Some((nodes, edges));
                    }
                }
                None => unresolved_pairs.push((resolved[i].0.clone(), resolved[j].0.clone())),
            }
        }
    }

    if let Some((nodes, edges)) = best {
        return Some(BridgePath {
            nodes,
            edges,
            connected_across_anchors: false,
            unresolved_pairs,
        });
    }

    // Last resort: admit proxy edges so the caller sees some candidate path.
    let proxy_adj = build_adjacency(snapshot, true);
    let mut proxy_best: Option<(Vec<EntityKey>, Vec<EdgeKey>)> = None;
    for i in 0..resolved.len() {
        for j in (i + 1)..resolved.len() {
            if let (Some(a), Some(b)) = (&resolved[i].1, &resolved[j].1) {
                if let Some((nodes, edges)) = bfs(&proxy_adj, a, b) {
                    let better = match &proxy_best {
                        None => true,
                        Some((_, be)) => edges.len() < be.len(),
                    };
                    if better {
                        proxy_best = Some((nodes, edges));
                    }
                }
            }
        }
    }

    let (nodes, edges) = proxy_best.unwrap_or_else(|| {
        // Nothing connects at all: surface each resolved anchor's own node.
        (
            resolved.iter().filter_map(|(_, k)| k.clone()).collect(),
            Vec::new(),
        )
    });
    Some(BridgePath {
        nodes,
        edges,
        connected_across_anchors: false,
        unresolved_pairs,
    })
}

/// Undirected adjacency in edge-insertion order.
///
/// No-connection edges are always excluded; proxy edges only when asked for.
fn build_adjacency(snapshot: &GraphSnapshot, include_proxy: bool) -> Adjacency {
    let mut adj: Adjacency = HashMap::new();
    for edge in &snapshot.edges {
        if edge.status == EdgeStatus::NoConnection {
            continue;
        }
        if edge.proxy && !include_proxy {
            continue;
        }
        let key = edge.key();
        adj.entry(edge.source.clone())
            .or_default()
            .push((edge.target.clone(), key.clone()));
        adj.entry(edge.target.clone())
            .or_default()
            .push((edge.source.clone(), key));
    }
    adj
}

/// Unweighted shortest path; ties broken by BFS discovery order, which is
/// insertion-order stable.
fn bfs(
    adj: &Adjacency,
    from: &EntityKey,
    to: &EntityKey,
) -> Option<(Vec<EntityKey>, Vec<EdgeKey>)> {
    if from == to {
        return Some((vec![from.clone()], Vec::new()));
    }
    let mut prev: HashMap<EntityKey, (EntityKey, EdgeKey)> = HashMap::new();
    let mut visited: HashSet<EntityKey> = HashSet::new();
    visited.insert(from.clone());
    let mut queue = VecDeque::from([from.clone()]);

    while let Some(current) = queue.pop_front() {
        let Some(neighbors) = adj.get(&current) else {
            continue;
        };
        for (next, edge_key) in neighbors {
            if !visited.insert(next.clone()) {
                continue;
            }
            prev.insert(next.clone(), (current.clone(), edge_key.clone()));
            if next == to {
                return Some(reconstruct(&prev, from, to));
            }
            queue.push_back(next.clone());
        }
    }
    None
}

fn reconstruct(
    prev: &HashMap<EntityKey, (EntityKey, EdgeKey)>,
    from: &EntityKey,
    to: &EntityKey,
) -> (Vec<EntityKey>, Vec<EdgeKey>) {
    let mut nodes = vec![to.clone()];
    let mut edges = Vec::new();
    let mut current = to;
    while current != from {
        let (parent, edge) = &prev[current];
        edges.push(edge.clone());
        nodes.push(parent.clone());
        current = parent;
    }
    nodes.reverse();
    edges.reverse();
    (nodes, edges)
}

/// Chain per-pair segments into one walk, deduplicating boundary nodes.
fn concatenate(segments: Vec<(Vec<EntityKey>, Vec<EdgeKey>)>) -> (Vec<EntityKey>, Vec<EdgeKey>) {
    let mut nodes: Vec<EntityKey> = Vec::new();
    let mut edges: Vec<EdgeKey> = Vec::new();
    for (segment_nodes, segment_edges) in segments {
        for node in segment_nodes {
            if nodes.last() != Some(&node) {
                nodes.push(node);
            }
        }
        edges.extend(segment_edges);
    }
    (nodes, edges)
}
