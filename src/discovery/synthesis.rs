//! Synthesis collaborator: composes the final narrative brief
//!
//! Synthesis consumes a compact summary of what the run found, never the
//! raw graph. Failure here is non-fatal; the run falls back to a
//! deterministic brief so the caller always receives a terminal `done`.

use crate::stream::PathSummary;
use async_trait::async_trait;
use thiserror::Error;

/// Errors from the synthesis collaborator.
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("synthesizer unavailable: {0}")]
    Unavailable(String),
    #[error("synthesizer returned an empty brief")]
    Empty,
}

/// Compact input handed to the synthesizer.
#[derive(Debug, Clone)]
pub struct EvidenceSummary {
    pub question: String,
    pub intent: String,
    pub path: Option<PathSummary>,
    /// Labels of the highest-scoring non-anchor nodes
    pub top_findings: Vec<String>,
    /// Labels of the first few ledger citations
    pub citation_preview: Vec<String>,
}

/// The synthesizer's structured output.
#[derive(Debug, Clone)]
pub struct Synthesis {
    pub brief: String,
    pub key_findings: Vec<String>,
    pub caveats: Vec<String>,
    pub next_actions: Vec<String>,
}

/// The synthesis collaborator interface.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, summary: &EvidenceSummary) -> Result<Synthesis, SynthesisError>;
}

/// Deterministic template synthesizer.
///
/// Produces a readable brief from the summary alone, with no external
/// dependency. Used by the demo server and as reference behavior in tests.
#[derive(Debug, Default)]
pub struct TemplateSynthesizer;

#[async_trait]
impl Synthesizer for TemplateSynthesizer {
    async fn synthesize(&self, summary: &EvidenceSummary) -> Result<Synthesis, SynthesisError> {
        let mut caveats = Vec::new();
        let brief = match &summary.path {
            Some(path) if path.connected_across_anchors => {
                let chain = path.nodes.join(" -> ");
                format!(
                    "The evidence graph connects the question's anchors through {} link(s): {}.",
                    path.edges.len(),
                    chain
                )
            }
            Some(path) => {
                for (a, b) in &path.unresolved_pairs {
                    caveats.push(format!("no evidence chain found between '{}' and '{}'", a, b));
                }
                "No complete evidence chain connects the question's anchors; each anchor's own evidence is summarized separately.".to_string()
            }
            None => {
                caveats.push("the anchors could not be located in the evidence graph".to_string());
                "The retrieved evidence did not resolve the question's anchors to known entities.".to_string()
            }
        };

        let mut key_findings = summary.top_findings.clone();
        key_findings.truncate(5);

        let next_actions = if summary.path.as_ref().map(|p| p.connected_across_anchors).unwrap_or(false) {
            vec!["review the bridging entities and their supporting citations".to_string()]
        } else {
            vec!["broaden the search terms or add intermediate entities to the question".to_string()]
        };

        Ok(Synthesis {
            brief,
            key_findings,
            caveats,
            next_actions,
        })
    }
}

/// Mock synthesizer for testing, with optional failure injection.
pub struct MockSynthesizer {
    response: Option<Synthesis>,
    fail_with: Option<String>,
}

impl MockSynthesizer {
    pub fn new() -> Self {
        Self {
            response: None,
            fail_with: None,
        }
    }

    /// Always return this synthesis.
    pub fn with_response(mut self, synthesis: Synthesis) -> Self {
        self.response = Some(synthesis);
        self
    }

    /// Make every call fail.
    pub fn failing(mut self, reason: impl Into<String>) -> Self {
        self.fail_with = Some(reason.into());
        self
    }
}

impl Default for MockSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Synthesizer for MockSynthesizer {
    async fn synthesize(&self, summary: &EvidenceSummary) -> Result<Synthesis, SynthesisError> {
        if let Some(reason) = &self.fail_with {
            return Err(SynthesisError::Unavailable(reason.clone()));
        }
        match &self.response {
            Some(synthesis) => Ok(synthesis.clone()),
            None => TemplateSynthesizer.synthesize(summary).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary_with_path(connected: bool) -> EvidenceSummary {
        EvidenceSummary {
            question: "how does obesity relate to type 2 diabetes".into(),
            intent: "mechanism".into(),
            path: Some(PathSummary {
                nodes: vec!["disease:obesity".into(), "target:irs1".into(), "disease:type-2-diabetes".into()],
                edges: vec!["e1".into(), "e2".into()],
                connected_across_anchors: connected,
                unresolved_pairs: if connected {
                    vec![]
                } else {
                    vec![("obesity".into(), "type 2 diabetes".into())]
                },
            }),
            top_findings: vec!["IRS1".into()],
            citation_preview: vec![],
        }
    }

    #[tokio::test]
    async fn connected_path_yields_chain_brief() {
        let synthesis = TemplateSynthesizer
            .synthesize(&summary_with_path(true))
            .await
            .unwrap();
        assert!(synthesis.brief.contains("target:irs1"));
        assert!(synthesis.caveats.is_empty());
    }

    #[tokio::test]
    async fn unconnected_path_yields_caveats() {
        let synthesis = TemplateSynthesizer
            .synthesize(&summary_with_path(false))
            .await
            .unwrap();
        assert!(!synthesis.caveats.is_empty());
        assert!(synthesis.brief.contains("No complete evidence chain"));
    }

    #[tokio::test]
    async fn mock_failure_injection() {
        let err = MockSynthesizer::new()
            .failing("model offline")
            .synthesize(&summary_with_path(true))
            .await
            .unwrap_err();
        assert!(matches!(err, SynthesisError::Unavailable(_)));
    }
}
