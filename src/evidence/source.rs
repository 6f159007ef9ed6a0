//! EvidenceSource: the interface evidence producers implement
//!
//! Each source is a typed query client (disease/target/pathway/drug/
//! literature) returning unordered batches of records to upsert. Per-call
//! failure and empty results are tolerated; a failing source degrades the
//! run's health map, it never kills the run.
//!
//! `StaticSource` is the in-memory implementation used by tests and the
//! demo server.

use super::citation::CitationDraft;
use crate::graph::{Entity, EntityKey, Relation};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Errors from a single evidence-source call.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source call timed out")]
    Timeout,
    #[error("source unavailable: {0}")]
    Unavailable(String),
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// One unordered batch of evidence from a producer.
#[derive(Debug, Clone, Default)]
pub struct EvidenceBatch {
    /// Entities to upsert
    pub entities: Vec<Entity>,
    /// Relations to upsert (endpoints may be in the same batch)
    pub relations: Vec<Relation>,
    /// Citations to fold into the ledger
    pub citations: Vec<CitationDraft>,
    /// Producer's self-reported article snippet count
    pub article_count: usize,
    /// Producer's self-reported trial snippet count
    pub trial_count: usize,
}

impl EvidenceBatch {
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relations.is_empty() && self.citations.is_empty()
    }

    pub fn with_entity(mut self, entity: Entity) -> Self {
        self.entities.push(entity);
        self
    }

    pub fn with_relation(mut self, relation: Relation) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn with_citation(mut self, citation: CitationDraft) -> Self {
        self.citations.push(citation);
        self
    }
}

/// A knowledge-source client the discovery run can query.
///
/// Abstracts over transport (HTTP API, local catalog, mock) so the run loop
/// doesn't depend on how evidence is reached.
#[async_trait]
pub trait EvidenceSource: Send + Sync {
    /// Stable identifier used in provenance tags and the health map.
    fn id(&self) -> &str;

    /// Search for evidence about a free-text term.
    async fn search(&self, query: &str, limit: usize) -> Result<EvidenceBatch, SourceError>;

    /// Look up details for a known entity (used by second-hop expansion).
    async fn lookup(&self, key: &EntityKey) -> Result<EvidenceBatch, SourceError>;
}

/// In-memory evidence source backed by a static catalog.
pub struct StaticSource {
    id: String,
    by_term: HashMap<String, EvidenceBatch>,
    by_key: HashMap<EntityKey, EvidenceBatch>,
    fail_with: Option<String>,
    delay: Option<Duration>,
}

impl StaticSource {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            by_term: HashMap::new(),
            by_key: HashMap::new(),
            fail_with: None,
            delay: None,
        }
    }

    /// Register a search result for a term (matched case-insensitively).
    pub fn with_search(mut self, term: impl Into<String>, batch: EvidenceBatch) -> Self {
        self.by_term.insert(term.into().to_lowercase(), batch);
        self
    }

    /// Register a lookup result for an entity key.
    pub fn with_lookup(mut self, key: EntityKey, batch: EvidenceBatch) -> Self {
        self.by_key.insert(key, batch);
        self
    }

    /// Make every call fail, for degraded-source tests.
    pub fn failing(mut self, reason: impl Into<String>) -> Self {
        self.fail_with = Some(reason.into());
        self
    }

    /// Delay every call, for timeout tests.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    async fn precheck(&self) -> Result<(), SourceError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(reason) = &self.fail_with {
            return Err(SourceError::Unavailable(reason.clone()));
        }
        Ok(())
    }
}

#[async_trait]
impl EvidenceSource for StaticSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn search(&self, query: &str, _limit: usize) -> Result<EvidenceBatch, SourceError> {
        self.precheck().await?;
        Ok(self
            .by_term
            .get(&query.to_lowercase())
            .cloned()
            .unwrap_or_default())
    }

    async fn lookup(&self, key: &EntityKey) -> Result<EvidenceBatch, SourceError> {
        self.precheck().await?;
        Ok(self.by_key.get(key).cloned().unwrap_or_default())
    }
}
