//! Entity: a typed node in the evidence graph
//!
//! Identity is derived from `(type, normalized primary id)`, never assigned
//! by the caller. Two records that normalize to the same key collapse into
//! one node with their attribute bags shallow-merged and scores max-merged.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Biomedical entity classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// A disease or condition
    Disease,
    /// A gene or protein target
    Target,
    /// A biological pathway
    Pathway,
    /// A drug or compound
    Drug,
    /// A free-text evidence finding
    Finding,
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disease => "disease",
            Self::Target => "target",
            Self::Pathway => "pathway",
            Self::Drug => "drug",
            Self::Finding => "finding",
        };
        write!(f, "{}", s)
    }
}

/// Stable identity of an entity node: `type:normalized-primary-id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(transparent)]
pub struct EntityKey(String);

impl EntityKey {
    /// Derive a key from a type and raw primary id.
    pub fn derive(entity_type: EntityType, primary_id: &str) -> Self {
        Self(format!("{}:{}", entity_type, normalize_id(primary_id)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EntityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Normalize a raw primary id to a deterministic key fragment.
///
/// Rules:
/// - Lowercased
/// - Whitespace runs, `:` and `/` collapse to single hyphens
/// - Other punctuation dropped, alphanumerics and `-` `_` `.` preserved
pub fn normalize_id(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_hyphen = false;
    for c in raw.trim().to_lowercase().chars() {
        if c.is_whitespace() || c == ':' || c == '/' {
            pending_hyphen = !out.is_empty();
        } else if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
            if pending_hyphen {
                out.push('-');
                pending_hyphen = false;
            }
            out.push(c);
        }
    }
    out
}

/// Typed values in an entity's open attribute bag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    String(String),
    Float(f64),
    Bool(bool),
}

/// Open attribute bag for provenance (source system, virtual flag, notes)
pub type Meta = HashMap<String, MetaValue>;

/// A node in the evidence graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    /// Entity classification
    pub entity_type: EntityType,
    /// Raw primary id as supplied by the producer
    pub primary_id: String,
    /// Human-readable label
    pub label: String,
    /// Alternate names used by anchor resolution
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    /// Relevance score in [0, 1]
    pub score: f32,
    /// Display size hint
    pub size_hint: f32,
    /// Provenance attribute bag
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub meta: Meta,
}

impl Entity {
    /// Create a new entity with a neutral score.
    pub fn new(entity_type: EntityType, primary_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            entity_type,
            primary_id: primary_id.into(),
            label: label.into(),
            aliases: Vec::new(),
            score: 0.5,
            size_hint: 1.0,
            meta: HashMap::new(),
        }
    }

    /// The derived identity key.
    pub fn key(&self) -> EntityKey {
        EntityKey::derive(self.entity_type, &self.primary_id)
    }

    /// Set the relevance score (clamped to [0, 1]).
    pub fn with_score(mut self, score: f32) -> Self {
        self.score = score.clamp(0.0, 1.0);
        self
    }

    /// Set the display size hint.
    pub fn with_size_hint(mut self, size_hint: f32) -> Self {
        self.size_hint = size_hint;
        self
    }

    /// Add an alternate name.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    /// Add a meta attribute.
    pub fn with_meta(mut self, key: impl Into<String>, value: MetaValue) -> Self {
        self.meta.insert(key.into(), value);
        self
    }

    /// Mark the entity as derived rather than retrieved.
    pub fn virtual_node(self) -> Self {
        self.with_meta("virtual", MetaValue::Bool(true))
    }

    /// Merge another record with the same identity into this one.
    ///
    /// Scores and size hints take the maximum. The richer (longer) label
    /// wins. Aliases are unioned, the meta bag is shallow-merged with the
    /// incoming record's entries taking precedence. Returns true if any
    /// attribute changed.
    pub fn merge_from(&mut self, other: &Entity) -> bool {
        debug_assert_eq!(self.key(), other.key());
        let mut changed = false;

        if other.score > self.score {
            self.score = other.score.clamp(0.0, 1.0);
            changed = true;
        }
        if other.size_hint > self.size_hint {
            self.size_hint = other.size_hint;
            changed = true;
        }
        if other.label.len() > self.label.len() {
            self.label = other.label.clone();
            changed = true;
        }
        for alias in &other.aliases {
            if !self.aliases.iter().any(|a| a.eq_ignore_ascii_case(alias)) {
                self.aliases.push(alias.clone());
                changed = true;
            }
        }
        for (k, v) in &other.meta {
            if self.meta.get(k) != Some(v) {
                self.meta.insert(k.clone(), v.clone());
                changed = true;
            }
        }
        changed
    }
}
