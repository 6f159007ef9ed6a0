//! Planning collaborator: turns a question into anchors
//!
//! The engine only consumes the fixed `AnchorPlan` shape; it does not care
//! how anchors were produced. Two implementations:
//! - `KeywordPlanner`: connective-phrase splitting (demo / offline use)
//! - `MockPlanner`: preconfigured plans (testing)

use crate::path::Anchor;
use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

/// Errors from the planning collaborator.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("planner unavailable: {0}")]
    Unavailable(String),
    #[error("no anchors found in question")]
    NoAnchors,
}

/// What the planner resolved from the question.
#[derive(Debug, Clone)]
pub struct AnchorPlan {
    pub anchors: Vec<Anchor>,
    pub intent: String,
    pub constraints: Vec<String>,
}

impl AnchorPlan {
    /// A plan bridging the given anchors, with a mechanism intent.
    pub fn bridging(anchors: Vec<Anchor>) -> Self {
        Self {
            anchors,
            intent: "mechanism".to_string(),
            constraints: Vec::new(),
        }
    }
}

/// The planning collaborator interface.
#[async_trait]
pub trait AnchorPlanner: Send + Sync {
    async fn resolve_anchors(&self, question: &str) -> Result<AnchorPlan, PlanError>;
}

/// Naive connective-phrase planner.
///
/// Stands in for the external NL planning collaborator when running the
/// demo server offline: strips a leading question frame and splits the rest
/// on relating connectives.
pub struct KeywordPlanner;

const QUESTION_FRAMES: &[&str] = &[
    "how does",
    "how do",
    "how is",
    "how are",
    "what links",
    "what connects",
    "is there a link between",
];

const CONNECTIVES: &[&str] = &[" relate to ", " related to ", " versus ", " vs ", " and "];

#[async_trait]
impl AnchorPlanner for KeywordPlanner {
    async fn resolve_anchors(&self, question: &str) -> Result<AnchorPlan, PlanError> {
        let mut text = question.trim().trim_end_matches(['?', '.', '!']).to_lowercase();
        for frame in QUESTION_FRAMES {
            if let Some(rest) = text.strip_prefix(frame) {
                text = rest.trim().to_string();
                break;
            }
        }
        let mut segments: Vec<String> = vec![text];
        for connective in CONNECTIVES {
            segments = segments
                .iter()
                .flat_map(|s| s.split(connective))
                .map(|s| s.trim().to_string())
                .collect();
        }
        let anchors: Vec<Anchor> = segments
            .into_iter()
            .filter(|s| !s.is_empty())
            .map(|mention| Anchor {
                confidence: 0.4,
                ..Anchor::mention(mention)
            })
            .collect();
        if anchors.len() < 2 {
            return Err(PlanError::NoAnchors);
        }
        Ok(AnchorPlan::bridging(anchors))
    }
}

/// Mock planner for testing; returns preconfigured plans.
pub struct MockPlanner {
    plans: HashMap<String, AnchorPlan>,
    fail_with: Option<String>,
}

impl MockPlanner {
    pub fn new() -> Self {
        Self {
            plans: HashMap::new(),
            fail_with: None,
        }
    }

    /// Register a plan for a specific question.
    pub fn with_plan(mut self, question: impl Into<String>, plan: AnchorPlan) -> Self {
        self.plans.insert(question.into(), plan);
        self
    }

    /// Make every call fail.
    pub fn failing(mut self, reason: impl Into<String>) -> Self {
        self.fail_with = Some(reason.into());
        self
    }
}

impl Default for MockPlanner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AnchorPlanner for MockPlanner {
    async fn resolve_anchors(&self, question: &str) -> Result<AnchorPlan, PlanError> {
        if let Some(reason) = &self.fail_with {
            return Err(PlanError::Unavailable(reason.clone()));
        }
        self.plans
            .get(question)
            .cloned()
            .ok_or(PlanError::NoAnchors)
    }
}
