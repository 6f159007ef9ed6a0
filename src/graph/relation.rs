//! Relation: a directed, typed edge between entity keys
//!
//! Edge identity is `(source, target, kind)`. Re-asserting the same identity
//! takes the maximum weight and keeps the richer note; edges are never
//! deleted, only downgraded via their status field.

use super::entity::EntityKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Relationship classification between entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// disease → target association
    DiseaseTarget,
    /// target → pathway membership
    TargetPathway,
    /// target → target interaction
    TargetTarget,
    /// drug → target modulation
    DrugTarget,
    /// disease → disease bridge
    DiseaseDisease,
    /// finding → entity support
    FindingSupport,
}

impl std::fmt::Display for RelationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::DiseaseTarget => "disease_target",
            Self::TargetPathway => "target_pathway",
            Self::TargetTarget => "target_target",
            Self::DrugTarget => "drug_target",
            Self::DiseaseDisease => "disease_disease",
            Self::FindingSupport => "finding_support",
        };
        write!(f, "{}", s)
    }
}

/// Connectivity status of an edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeStatus {
    /// Asserted but not yet confirmed
    Candidate,
    /// Confirmed by retrieved evidence
    Connected,
    /// Explicitly found not to connect
    NoConnection,
}

/// Identity of an edge: `(source, target, kind)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct EdgeKey {
    pub source: EntityKey,
    pub target: EntityKey,
    pub kind: RelationKind,
}

impl std::fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}->{}#{}", self.source, self.target, self.kind)
    }
}

/// A directed edge in the evidence graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relation {
    /// Source entity key
    pub source: EntityKey,
    /// Target entity key
    pub target: EntityKey,
    /// Relationship classification
    pub kind: RelationKind,
    /// Evidence weight in [0, 1]
    pub weight: f32,
    /// Connectivity status
    pub status: EdgeStatus,
    /// Which producer asserted this edge
    pub provenance: String,
    /// Free-form note
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Placeholder edge asserted only to keep anchors visually linked;
    /// excluded from connectivity reasoning unless no real evidence exists
    #[serde(default)]
    pub proxy: bool,
    /// When the edge was first asserted
    pub asserted_at: DateTime<Utc>,
}

impl Relation {
    /// Create a new candidate edge.
    pub fn new(source: EntityKey, target: EntityKey, kind: RelationKind) -> Self {
        Self {
            source,
            target,
            kind,
            weight: 0.5,
            status: EdgeStatus::Candidate,
            provenance: String::new(),
            note: None,
            proxy: false,
            asserted_at: Utc::now(),
        }
    }

    /// The edge's identity key.
    pub fn key(&self) -> EdgeKey {
        EdgeKey {
            source: self.source.clone(),
            target: self.target.clone(),
            kind: self.kind,
        }
    }

    /// Set the evidence weight (clamped to [0, 1]).
    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight.clamp(0.0, 1.0);
        self
    }

    /// Set the status.
    pub fn with_status(mut self, status: EdgeStatus) -> Self {
        self.status = status;
        self
    }

    /// Set the asserting producer.
    pub fn with_provenance(mut self, provenance: impl Into<String>) -> Self {
        self.provenance = provenance.into();
        self
    }

    /// Attach a note.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Mark as a proxy placeholder.
    pub fn proxy_edge(mut self) -> Self {
        self.proxy = true;
        self
    }

    /// Merge a re-assertion of the same identity into this edge.
    ///
    /// Weight takes the maximum so a high-confidence earlier assertion is
    /// never weakened by a later, weaker one. The longer note wins. Status is
    /// overwritten only by an explicit (non-candidate) assertion. A proxy
    /// edge becomes real the moment any non-proxy producer asserts it.
    /// Returns true if anything changed.
    pub fn merge_from(&mut self, other: &Relation) -> bool {
        debug_assert_eq!(self.key(), other.key());
        let mut changed = false;

        if other.weight > self.weight {
            self.weight = other.weight.clamp(0.0, 1.0);
            changed = true;
        }
        let other_note_len = other.note.as_deref().map(str::len).unwrap_or(0);
        let self_note_len = self.note.as_deref().map(str::len).unwrap_or(0);
        if other_note_len > self_note_len {
            self.note = other.note.clone();
            changed = true;
        }
        if other.status != EdgeStatus::Candidate && other.status != self.status {
            self.status = other.status;
            changed = true;
        }
        if self.proxy && !other.proxy {
            self.proxy = false;
            self.provenance = other.provenance.clone();
            changed = true;
        }
        changed
    }
}
