//! Typed events delivered to the caller while discovery is running
//!
//! One event type per protocol message. Events are append-only and
//! best-effort: nothing previously emitted is ever retracted, so the caller
//! can materialize deltas as they arrive.

use crate::evidence::Citation;
use crate::graph::{EdgeStatus, Entity, EntityType, Relation};
use crate::path::BridgePath;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Discovery run phase, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Planning,
    Gathering,
    Expanding,
    Synthesizing,
    Finished,
}

/// Per-source health flag surfaced in status events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceHealth {
    /// Responding normally
    Green,
    /// Slow or timed out
    Yellow,
    /// Failing
    Red,
}

/// Wire form of a node in a graph delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSummary {
    pub key: String,
    pub label: String,
    pub entity_type: EntityType,
    pub score: f32,
}

impl From<&Entity> for NodeSummary {
    fn from(entity: &Entity) -> Self {
        Self {
            key: entity.key().to_string(),
            label: entity.label.clone(),
            entity_type: entity.entity_type,
            score: entity.score,
        }
    }
}

/// Wire form of an edge in a graph delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeSummary {
    pub key: String,
    pub source: String,
    pub target: String,
    pub kind: String,
    pub weight: f32,
    pub status: EdgeStatus,
    pub proxy: bool,
}

impl From<&Relation> for EdgeSummary {
    fn from(relation: &Relation) -> Self {
        Self {
            key: relation.key().to_string(),
            source: relation.source.to_string(),
            target: relation.target.to_string(),
            kind: relation.kind.to_string(),
            weight: relation.weight,
            status: relation.status,
            proxy: relation.proxy,
        }
    }
}

/// Wire form of the current bridge path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathSummary {
    pub nodes: Vec<String>,
    pub edges: Vec<String>,
    pub connected_across_anchors: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unresolved_pairs: Vec<(String, String)>,
}

impl From<&BridgePath> for PathSummary {
    fn from(path: &BridgePath) -> Self {
        Self {
            nodes: path.nodes.iter().map(|k| k.to_string()).collect(),
            edges: path.edges.iter().map(|k| k.to_string()).collect(),
            connected_across_anchors: path.connected_across_anchors,
            unresolved_pairs: path.unresolved_pairs.clone(),
        }
    }
}

/// Cost/usage summary carried by the final event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunUsage {
    pub elapsed_ms: u64,
    pub sources_queried: usize,
    pub batches_applied: usize,
    /// True if budget pressure skipped expansion work
    pub budget_degraded: bool,
}

/// The consolidated final result delivered before the terminal event.
///
/// A caller that only reads the last `done` event still gets the complete
/// outcome: brief, structured findings, path, citations, usage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinalBrief {
    pub brief: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_findings: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub caveats: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub next_actions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathSummary>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<Citation>,
    /// Aggregate article count (max of self-reported and ledger-held)
    pub article_total: usize,
    /// Aggregate trial count (max of self-reported and ledger-held)
    pub trial_total: usize,
    pub usage: RunUsage,
}

/// One event on the run's ordered channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// Phase, progress, and source-health heartbeat
    Status {
        phase: Phase,
        message: String,
        percent: u8,
        elapsed_ms: u64,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        sources: BTreeMap<String, SourceHealth>,
    },
    /// Newly upserted nodes/edges plus running totals
    GraphDelta {
        nodes: Vec<NodeSummary>,
        edges: Vec<EdgeSummary>,
        node_total: usize,
        edge_total: usize,
    },
    /// The bridge path changed signature
    PathUpdate { path: PathSummary },
    /// Newly issued citations
    CitationBundle { citations: Vec<Citation> },
    /// Terminal: graceful completion with the consolidated result
    Done { brief: FinalBrief },
    /// Terminal: the run ended abnormally
    Error { message: String, recoverable: bool },
}

impl RunEvent {
    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_snake_case_tags() {
        let event = RunEvent::Status {
            phase: Phase::Gathering,
            message: "querying sources".into(),
            percent: 42,
            elapsed_ms: 1500,
            sources: BTreeMap::new(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "status");
        assert_eq!(json["phase"], "gathering");
        assert_eq!(json["percent"], 42);
        assert!(json.get("sources").is_none(), "empty map is omitted");
    }

    #[test]
    fn terminal_detection() {
        assert!(RunEvent::Done { brief: FinalBrief::default() }.is_terminal());
        assert!(RunEvent::Error { message: "x".into(), recoverable: false }.is_terminal());
        assert!(!RunEvent::PathUpdate {
            path: PathSummary {
                nodes: vec![],
                edges: vec![],
                connected_across_anchors: false,
                unresolved_pairs: vec![],
            }
        }
        .is_terminal());
    }

    #[test]
    fn events_round_trip_through_json() {
        let event = RunEvent::Error {
            message: "transport write failed".into(),
            recoverable: false,
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: RunEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, back);
    }
}
