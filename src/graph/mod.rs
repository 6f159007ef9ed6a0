//! Core evidence-graph data structures

mod entity;
mod relation;
mod store;


pub use entity::{Entity, EntityKey, EntityType, Meta, MetaValue};
pub use relation::{EdgeKey, EdgeStatus, Relation, RelationKind};
pub use store::{DiscoveryGraph, EdgeUpsert, GraphDelta, GraphError, GraphSnapshot, NodeUpsert};
