//! Evigraph: Evidence-Graph Engine for Biomedical Mechanism Discovery
//!
//! Answers open-ended "how does X relate to Y" questions by incrementally
//! assembling a typed evidence graph (diseases, targets, pathways, drugs,
//! findings) from concurrent evidence producers, then locating a bridging
//! mechanism path between the question's anchors.
//!
//! # Core Concepts
//!
//! - **Entities**: typed biomedical nodes with derived identity and max-merge scores
//! - **Relations**: directed typed edges; re-assertion strengthens, never weakens
//! - **Anchors**: the entities the question is about, resolved to graph nodes
//! - **Bridge path**: the shortest evidence chain connecting the anchors
//! - **Runs**: one budgeted discovery execution per session, streamed as events
//!
//! # Example
//!
//! ```
//! use evigraph::DiscoveryGraph;
//!
//! let graph = DiscoveryGraph::new();
//! assert_eq!(graph.node_count(), 0);
//! ```

pub mod config;
pub mod discovery;
pub mod evidence;
mod graph;
pub mod path;
pub mod server;
pub mod session;
pub mod stream;

pub use config::DiscoveryConfig;
pub use discovery::{
    AnchorPlan, AnchorPlanner, DiscoveryError, DiscoveryService, EvidenceSummary, KeywordPlanner,
    MockPlanner, MockSynthesizer, PlanError, Synthesis, SynthesisError, Synthesizer,
    TemplateSynthesizer,
};
pub use evidence::{
    Citation, CitationDraft, CitationKind, CitationLedger, EvidenceBatch, EvidenceSource,
    SourceError, StaticSource,
};
pub use graph::{
    DiscoveryGraph, EdgeKey, EdgeStatus, EdgeUpsert, Entity, EntityKey, EntityType, GraphDelta,
    GraphError, GraphSnapshot, Meta, MetaValue, NodeUpsert, Relation, RelationKind,
};
pub use path::{resolve_path, Anchor, BridgePath};
pub use session::{CancellationToken, RunBudget, RunStatus, SessionError, SessionManager};
pub use stream::{
    EventChannel, FinalBrief, PathSummary, Phase, ProgressBand, RunEvent, RunUsage, SourceHealth,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
