//! Anchor: an entity the user's question is about
//!
//! Anchors are supplied by the planning collaborator and are immutable for
//! the run. Resolution maps each anchor to a graph node: exact identity
//! match first, then token-overlap similarity against labels and aliases.

use crate::graph::{EntityKey, EntityType, GraphSnapshot};
use serde::{Deserialize, Serialize};

/// One entity named or implied by the question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anchor {
    /// The raw mention string from the question
    pub mention: String,
    /// Expected entity type, if the planner inferred one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<EntityType>,
    /// Resolved external identifier, if the planner found one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Resolved canonical name, if the planner found one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Planner confidence in the resolution
    pub confidence: f32,
}

impl Anchor {
    /// An anchor with nothing but a mention.
    pub fn mention(mention: impl Into<String>) -> Self {
        Self {
            mention: mention.into(),
            entity_type: None,
            id: None,
            name: None,
            confidence: 0.5,
        }
    }

    /// A fully resolved anchor.
    pub fn resolved(
        mention: impl Into<String>,
        entity_type: EntityType,
        id: impl Into<String>,
        name: impl Into<String>,
        confidence: f32,
    ) -> Self {
        Self {
            mention: mention.into(),
            entity_type: Some(entity_type),
            id: Some(id.into()),
            name: Some(name.into()),
            confidence,
        }
    }

    /// The display label for this anchor (canonical name if known).
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.mention)
    }

    /// Map this anchor to a node in the snapshot.
    ///
    /// Exact `(type, id)` identity match wins. Otherwise every node's label
    /// and aliases are scored by token overlap against the anchor's name and
    /// mention, and the best match at or above `floor` is accepted. Ties go
    /// to the earlier-inserted node.
    pub fn resolve(&self, snapshot: &GraphSnapshot, floor: f32) -> Option<EntityKey> {
        if let (Some(entity_type), Some(id)) = (self.entity_type, self.id.as_deref()) {
            let key = EntityKey::derive(entity_type, id);
            if snapshot.contains(&key) {
                return Some(key);
            }
        }

        let mut best: Option<(EntityKey, f32)> = None;
        for node in &snapshot.nodes {
            let mut score = token_overlap(self.label(), &node.label);
            score = score.max(token_overlap(&self.mention, &node.label));
            for alias in &node.aliases {
                score = score.max(token_overlap(self.label(), alias));
                score = score.max(token_overlap(&self.mention, alias));
            }
            if score >= floor && best.as_ref().map(|(_, s)| score > *s).unwrap_or(true) {
                best = Some((node.key(), score));
            }
        }
        best.map(|(key, _)| key)
    }
}

/// Token-overlap similarity between two strings, in [0, 1].
///
/// Dice coefficient over lowercase alphanumeric tokens, with a containment
/// floor: when one token set fully contains the other, the score is at least
/// 0.75 (so "diabetes" still matches "type 2 diabetes").
pub fn token_overlap(a: &str, b: &str) -> f32 {
    let ta = tokens(a);
    let tb = tokens(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let overlap = ta.iter().filter(|t| tb.contains(*t)).count();
    if overlap == 0 {
        return 0.0;
    }
    let dice = (2.0 * overlap as f32) / (ta.len() + tb.len()) as f32;
    if overlap == ta.len().min(tb.len()) {
        dice.max(0.75)
    } else {
        dice
    }
}

fn tokens(s: &str) -> Vec<String> {
    let mut out: Vec<String> = s
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();
    out.dedup();
    out
}
