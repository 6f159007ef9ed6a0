//! Discovery orchestration: sessions, runs, and their collaborators
//!
//! `DiscoveryService` is the library's front door: it owns the session
//! manager and the pluggable collaborators (planner, synthesizer, evidence
//! sources) and spawns one budgeted run task per admitted request.

mod planner;
mod run;
mod synthesis;

pub use planner::{AnchorPlan, AnchorPlanner, KeywordPlanner, MockPlanner, PlanError};
pub use synthesis::{
    EvidenceSummary, MockSynthesizer, Synthesis, SynthesisError, Synthesizer, TemplateSynthesizer,
};

use crate::config::DiscoveryConfig;
use crate::evidence::EvidenceSource;
use crate::session::{RunStatus, SessionError, SessionManager};
use crate::stream::{EventChannel, RunEvent};
use run::RunContext;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

/// Terminal run failures, mirrored onto the stream as `error` events.
///
/// Source and synthesis failures never reach this level; they degrade the
/// result instead.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("run interrupted")]
    Interrupted,
    #[error("{0}")]
    Fatal(String),
}

/// Owns discovery collaborators and admits runs.
pub struct DiscoveryService {
    sessions: Arc<SessionManager>,
    planner: Arc<dyn AnchorPlanner>,
    synthesizer: Arc<dyn Synthesizer>,
    sources: Vec<Arc<dyn EvidenceSource>>,
    config: DiscoveryConfig,
}

impl DiscoveryService {
    pub fn new(
        planner: Arc<dyn AnchorPlanner>,
        synthesizer: Arc<dyn Synthesizer>,
        config: DiscoveryConfig,
    ) -> Self {
        Self {
            sessions: Arc::new(SessionManager::new(config.stale_after)),
            planner,
            synthesizer,
            sources: Vec::new(),
            config,
        }
    }

    /// Register an evidence source. Sources are queried concurrently.
    pub fn with_source(mut self, source: Arc<dyn EvidenceSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Start a discovery run for a session.
    ///
    /// Admits the session (one active run per key), spawns the run task, and
    /// returns the run id with the receiving end of its event stream. The
    /// stream always ends with a terminal `done` or `error` event.
    pub fn start(
        &self,
        session_key: &str,
        question: &str,
    ) -> Result<(Uuid, UnboundedReceiver<RunEvent>), SessionError> {
        let run_id = Uuid::new_v4();
        let token = self.sessions.admit(session_key, run_id)?;
        let (channel, rx) = EventChannel::new();
        tracing::info!(session = session_key, run = %run_id, question, "discovery run admitted");
        let context = RunContext {
            run_id,
            session_key: session_key.to_string(),
            question: question.to_string(),
            planner: Arc::clone(&self.planner),
            synthesizer: Arc::clone(&self.synthesizer),
            sources: self.sources.clone(),
            config: self.config.clone(),
            token,
            channel,
            sessions: Arc::clone(&self.sessions),
        };
        tokio::spawn(context.execute());
        Ok((run_id, rx))
    }

    /// Interrupt the session's active run. Returns false if none was active.
    pub fn interrupt(&self, session_key: &str) -> bool {
        self.sessions.interrupt(session_key)
    }

    /// Introspect the session's active run.
    pub fn session_status(&self, session_key: &str) -> Option<RunStatus> {
        self.sessions.status(session_key)
    }

    /// Shared handle to the session manager, for sweep scheduling.
    pub fn sessions(&self) -> Arc<SessionManager> {
        Arc::clone(&self.sessions)
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }
}
