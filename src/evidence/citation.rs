//! Citation ledger: deduplicated, stably indexed evidence references
//!
//! A citation's index is assigned on first insertion and never reissued or
//! renumbered; the caller may already be displaying inline references by
//! index. Aggregate counts take the maximum of producer-reported and actual
//! ledger counts, never a blind sum, because independent producers may
//! double-report the same underlying evidence.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What kind of evidence a citation points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CitationKind {
    Article,
    Trial,
    Database,
    Other,
}

/// A citation as submitted by a producer, before an index is issued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitationDraft {
    pub kind: CitationKind,
    pub label: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl CitationDraft {
    pub fn new(kind: CitationKind, label: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            kind,
            label: label.into(),
            source: source.into(),
            url: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    fn dedup_key(&self) -> CitationKey {
        CitationKey {
            kind: self.kind,
            url: self.url.clone().unwrap_or_default(),
            source: self.source.to_lowercase(),
            label: self.label.to_lowercase(),
        }
    }
}

/// An indexed citation in the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// Stable 1-based index, issued once
    pub index: u32,
    pub kind: CitationKind,
    pub label: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CitationKey {
    kind: CitationKind,
    url: String,
    source: String,
    label: String,
}

/// The per-run citation ledger.
#[derive(Debug, Default)]
pub struct CitationLedger {
    citations: Vec<Citation>,
    index: HashMap<CitationKey, u32>,
    reported_articles: usize,
    reported_trials: usize,
}

impl CitationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a batch of drafts into the ledger.
    ///
    /// Duplicates (same dedup key) are no-ops; new citations are appended
    /// with strictly increasing indices continuing from the current maximum.
    /// Returns only the newly issued citations.
    pub fn merge(&mut self, drafts: Vec<CitationDraft>) -> Vec<Citation> {
        let mut issued = Vec::new();
        for draft in drafts {
            let key = draft.dedup_key();
            if self.index.contains_key(&key) {
                continue;
            }
            let index = self.citations.len() as u32 + 1;
            let citation = Citation {
                index,
                kind: draft.kind,
                label: draft.label,
                source: draft.source,
                url: draft.url,
            };
            self.index.insert(key, index);
            self.citations.push(citation.clone());
            issued.push(citation);
        }
        issued
    }

    /// Record a producer's self-reported snippet counts.
    pub fn report_counts(&mut self, articles: usize, trials: usize) {
        self.reported_articles = self.reported_articles.max(articles);
        self.reported_trials = self.reported_trials.max(trials);
    }

    fn kind_count(&self, kind: CitationKind) -> usize {
        self.citations.iter().filter(|c| c.kind == kind).count()
    }

    /// Article total: max of any self-report and the ledger's actual count.
    pub fn article_total(&self) -> usize {
        self.reported_articles.max(self.kind_count(CitationKind::Article))
    }

    /// Trial total: max of any self-report and the ledger's actual count.
    pub fn trial_total(&self) -> usize {
        self.reported_trials.max(self.kind_count(CitationKind::Trial))
    }

    pub fn all(&self) -> &[Citation] {
        &self.citations
    }

    pub fn len(&self) -> usize {
        self.citations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.citations.is_empty()
    }
}
