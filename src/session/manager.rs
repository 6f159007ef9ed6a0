//! SessionManager: at most one active discovery run per session key
//!
//! A second admission for a different run id on an active session is
//! rejected, never queued; the caller must interrupt first. Interrupt
//! signals the run's token and frees the slot immediately, without waiting
//! for the run to observe the signal. A sweep reclaims sessions whose run
//! outlived the staleness threshold (client disconnected without
//! interrupting).

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use uuid::Uuid;

/// Cooperative cancellation token shared between a session slot and its run.
///
/// Interrupt flips the token; the run observes it at its next suspension
/// point. Cancellation between checks has no effect until the next check, so
/// already-committed graph state stays valid.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Signal cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors from session admission
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session '{session}' already has an active run {active_run}")]
    Busy { session: String, active_run: Uuid },
}

/// Status of an active run, for introspection.
#[derive(Debug, Clone)]
pub struct RunStatus {
    pub run_id: Uuid,
    pub elapsed: Duration,
}

#[derive(Debug)]
struct ActiveRun {
    run_id: Uuid,
    started: Instant,
    token: CancellationToken,
}

/// Owns the session → active run mapping.
#[derive(Debug)]
pub struct SessionManager {
    sessions: DashMap<String, ActiveRun>,
    stale_after: Duration,
}

impl SessionManager {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            stale_after,
        }
    }

    /// Admit a run for a session key.
    ///
    /// Returns the run's cancellation token on success. Re-admitting the
    /// currently active run id is idempotent and returns the existing token;
    /// any other run id is rejected while the session is busy.
    pub fn admit(&self, session_key: &str, run_id: Uuid) -> Result<CancellationToken, SessionError> {
        match self.sessions.entry(session_key.to_string()) {
            Entry::Occupied(entry) => {
                let active = entry.get();
                if active.run_id == run_id {
                    Ok(active.token.clone())
                } else {
                    Err(SessionError::Busy {
                        session: session_key.to_string(),
                        active_run: active.run_id,
                    })
                }
            }
            Entry::Vacant(entry) => {
                let token = CancellationToken::new();
                entry.insert(ActiveRun {
                    run_id,
                    started: Instant::now(),
                    token: token.clone(),
                });
                Ok(token)
            }
        }
    }

    /// Signal cancellation to the session's active run and free the slot
    /// immediately. Returns false if no run was active.
    pub fn interrupt(&self, session_key: &str) -> bool {
        match self.sessions.remove(session_key) {
            Some((_, active)) => {
                active.token.cancel();
                tracing::info!(session = session_key, run = %active.run_id, "run interrupted");
                true
            }
            None => false,
        }
    }

    /// Release the slot, but only if it is still owned by the given run id.
    ///
    /// A run that was interrupted (and whose slot was possibly re-admitted
    /// to a new run) must not release the successor's slot.
    pub fn release(&self, session_key: &str, run_id: Uuid) {
        self.sessions
            .remove_if(session_key, |_, active| active.run_id == run_id);
    }

    /// Cancel and remove sessions whose run outlived the staleness
    /// threshold. Returns how many were reclaimed.
    pub fn sweep(&self) -> usize {
        let stale: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| entry.started.elapsed() > self.stale_after)
            .map(|entry| entry.key().clone())
            .collect();
        let mut swept = 0;
        for key in stale {
            if let Some((_, active)) = self
                .sessions
                .remove_if(&key, |_, a| a.started.elapsed() > self.stale_after)
            {
                active.token.cancel();
                tracing::warn!(session = key, run = %active.run_id, "stale run swept");
                swept += 1;
            }
        }
        swept
    }

    /// Introspect the active run for a session, if any.
    pub fn status(&self, session_key: &str) -> Option<RunStatus> {
        self.sessions.get(session_key).map(|active| RunStatus {
            run_id: active.run_id,
            elapsed: active.started.elapsed(),
        })
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }
}
