//! DiscoveryGraph: the mutable node/edge store for one run
//!
//! All mutation goes through one serialized entry point; readers take a
//! cloned, consistent snapshot rather than iterating live state. Nodes and
//! edges are never physically removed; insertion order is stable for the
//! run's lifetime, which makes BFS tie-breaking deterministic.

use super::entity::{Entity, EntityKey};
use super::relation::{EdgeKey, Relation};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

/// Errors from graph store operations
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("unknown endpoint: {0}")]
    MissingEndpoint(EntityKey),
}

/// Outcome of a single node upsert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeUpsert {
    pub key: EntityKey,
    /// First time this identity was seen
    pub created: bool,
    /// Any attribute changed (always true when created)
    pub changed: bool,
}

/// Outcome of a single edge upsert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeUpsert {
    pub key: EdgeKey,
    pub created: bool,
    pub changed: bool,
}

/// What one batch application did to the graph.
///
/// Carries full copies of the touched nodes/edges so the streaming layer can
/// serialize them without re-reading the store.
#[derive(Debug, Clone, Default)]
pub struct GraphDelta {
    /// Nodes created or changed by the batch
    pub nodes: Vec<Entity>,
    /// Edges created or changed by the batch
    pub edges: Vec<Relation>,
    /// Edges skipped because an endpoint was missing
    pub rejections: Vec<String>,
    /// Node count after the batch
    pub node_total: usize,
    /// Edge count after the batch
    pub edge_total: usize,
}

impl GraphDelta {
    /// True if the batch changed nothing.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }
}

/// An immutable, consistent copy of the graph at one point in time.
#[derive(Debug, Clone, Default)]
pub struct GraphSnapshot {
    /// Nodes in insertion order
    pub nodes: Vec<Entity>,
    /// Edges in insertion order
    pub edges: Vec<Relation>,
    index: HashMap<EntityKey, usize>,
}

impl GraphSnapshot {
    /// Look up a node by key.
    pub fn get(&self, key: &EntityKey) -> Option<&Entity> {
        self.index.get(key).map(|&i| &self.nodes[i])
    }

    /// Whether a node exists.
    pub fn contains(&self, key: &EntityKey) -> bool {
        self.index.contains_key(key)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}

#[derive(Debug, Default)]
struct GraphInner {
    nodes: Vec<Entity>,
    node_index: HashMap<EntityKey, usize>,
    edges: Vec<Relation>,
    edge_index: HashMap<EdgeKey, usize>,
}

impl GraphInner {
    fn upsert_node(&mut self, entity: Entity) -> NodeUpsert {
        let key = entity.key();
        match self.node_index.get(&key) {
            Some(&i) => {
                let changed = self.nodes[i].merge_from(&entity);
                NodeUpsert { key, created: false, changed }
            }
            None => {
                self.node_index.insert(key.clone(), self.nodes.len());
                self.nodes.push(entity);
                NodeUpsert { key, created: true, changed: true }
            }
        }
    }

    fn upsert_edge(&mut self, relation: Relation) -> Result<EdgeUpsert, GraphError> {
        if !self.node_index.contains_key(&relation.source) {
            return Err(GraphError::MissingEndpoint(relation.source.clone()));
        }
        if !self.node_index.contains_key(&relation.target) {
            return Err(GraphError::MissingEndpoint(relation.target.clone()));
        }
        let key = relation.key();
        match self.edge_index.get(&key) {
            Some(&i) => {
                let changed = self.edges[i].merge_from(&relation);
                Ok(EdgeUpsert { key, created: false, changed })
            }
            None => {
                self.edge_index.insert(key.clone(), self.edges.len());
                self.edges.push(relation);
                Ok(EdgeUpsert { key, created: true, changed: true })
            }
        }
    }
}

/// The per-run evidence graph store.
#[derive(Debug, Default)]
pub struct DiscoveryGraph {
    inner: RwLock<GraphInner>,
}

impl DiscoveryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    // Lock poisoning can only come from a panic mid-merge; the data is still
    // structurally sound, so recover the guard rather than propagating.
    fn read(&self) -> RwLockReadGuard<'_, GraphInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, GraphInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Upsert a single node. Idempotent and commutative; scores only go up.
    pub fn upsert_node(&self, entity: Entity) -> NodeUpsert {
        self.write().upsert_node(entity)
    }

    /// Upsert a single edge. Both endpoints must already exist.
    pub fn upsert_edge(&self, relation: Relation) -> Result<EdgeUpsert, GraphError> {
        self.write().upsert_edge(relation)
    }

    /// Apply a batch of nodes and edges as one critical section.
    ///
    /// Nodes are applied before edges so intra-batch endpoints resolve.
    /// Edges whose endpoints are still missing are skipped and reported in
    /// the delta's rejections, matching the partial-commit model: valid items
    /// land even when some are rejected.
    pub fn apply(&self, entities: Vec<Entity>, relations: Vec<Relation>) -> GraphDelta {
        let mut inner = self.write();
        let mut delta = GraphDelta::default();

        for entity in entities {
            let outcome = inner.upsert_node(entity);
            if outcome.changed {
                if let Some(&i) = inner.node_index.get(&outcome.key) {
                    delta.nodes.push(inner.nodes[i].clone());
                }
            }
        }
        for relation in relations {
            match inner.upsert_edge(relation) {
                Ok(outcome) => {
                    if outcome.changed {
                        if let Some(&i) = inner.edge_index.get(&outcome.key) {
                            delta.edges.push(inner.edges[i].clone());
                        }
                    }
                }
                Err(e) => delta.rejections.push(e.to_string()),
            }
        }

        delta.node_total = inner.nodes.len();
        delta.edge_total = inner.edges.len();
        delta
    }

    /// Take a consistent snapshot of the whole graph.
    pub fn snapshot(&self) -> GraphSnapshot {
        let inner = self.read();
        GraphSnapshot {
            nodes: inner.nodes.clone(),
            edges: inner.edges.clone(),
            index: inner.node_index.clone(),
        }
    }

    pub fn node_count(&self) -> usize {
        self.read().nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.read().edges.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EntityType, RelationKind};

    fn disease(id: &str) -> Entity {
        Entity::new(EntityType::Disease, id, id)
    }

    fn target(id: &str) -> Entity {
        Entity::new(EntityType::Target, id, id)
    }

    #[test]
    fn upsert_node_is_idempotent() {
        let graph = DiscoveryGraph::new();
        let first = graph.upsert_node(disease("obesity").with_score(0.8));
        assert!(first.created);
        let second = graph.upsert_node(disease("obesity").with_score(0.8));
        assert!(!second.created);
        assert!(!second.changed);
        assert_eq!(graph.node_count(), 1);
    }

    #[test]
    fn upsert_edge_requires_endpoints() {
        let graph = DiscoveryGraph::new();
        graph.upsert_node(disease("obesity"));
        let missing = Relation::new(
            disease("obesity").key(),
            target("IRS1").key(),
            RelationKind::DiseaseTarget,
        );
        assert!(matches!(
            graph.upsert_edge(missing),
            Err(GraphError::MissingEndpoint(_))
        ));
    }

    #[test]
    fn apply_resolves_intra_batch_endpoints() {
        let graph = DiscoveryGraph::new();
        let edge = Relation::new(
            disease("obesity").key(),
            target("IRS1").key(),
            RelationKind::DiseaseTarget,
        );
        let delta = graph.apply(vec![disease("obesity"), target("IRS1")], vec![edge]);
        assert_eq!(delta.nodes.len(), 2);
        assert_eq!(delta.edges.len(), 1);
        assert!(delta.rejections.is_empty());
        assert_eq!(delta.node_total, 2);
        assert_eq!(delta.edge_total, 1);
    }

    #[test]
    fn apply_rejects_dangling_edges_without_failing() {
        let graph = DiscoveryGraph::new();
        let dangling = Relation::new(
            disease("obesity").key(),
            target("GHOST").key(),
            RelationKind::DiseaseTarget,
        );
        let delta = graph.apply(vec![disease("obesity")], vec![dangling]);
        assert_eq!(delta.nodes.len(), 1);
        assert!(delta.edges.is_empty());
        assert_eq!(delta.rejections.len(), 1);
    }

    #[test]
    fn reapplying_a_batch_yields_empty_delta() {
        let graph = DiscoveryGraph::new();
        let edge = Relation::new(
            disease("obesity").key(),
            target("IRS1").key(),
            RelationKind::DiseaseTarget,
        )
        .with_weight(0.7);
        let batch_nodes = vec![disease("obesity").with_score(0.6), target("IRS1")];
        graph.apply(batch_nodes.clone(), vec![edge.clone()]);
        let delta = graph.apply(batch_nodes, vec![edge]);
        assert!(delta.is_empty(), "second application should be a no-op");
    }

    #[test]
    fn snapshot_preserves_insertion_order() {
        let graph = DiscoveryGraph::new();
        graph.upsert_node(disease("b"));
        graph.upsert_node(disease("a"));
        graph.upsert_node(disease("c"));
        let snap = graph.snapshot();
        let ids: Vec<_> = snap.nodes.iter().map(|n| n.primary_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
        assert!(snap.contains(&disease("a").key()));
    }

    #[test]
    fn snapshot_is_isolated_from_later_writes() {
        let graph = DiscoveryGraph::new();
        graph.upsert_node(disease("obesity"));
        let snap = graph.snapshot();
        graph.upsert_node(disease("asthma"));
        assert_eq!(snap.node_count(), 1);
        assert_eq!(graph.node_count(), 2);
    }
}
