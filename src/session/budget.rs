//! Wall-clock budget rationing for one run
//!
//! The overall deadline is computed once at run start. Every sub-operation's
//! timeout is the lesser of its nominal budget and the remaining run budget
//! minus a safety margin, so late-stage operations are starved rather than
//! allowed to overrun. Below the reserve threshold, lower-priority expansion
//! work is skipped in favor of synthesis and consolidation.

use std::time::{Duration, Instant};

/// Cooperative time budget for one discovery run.
#[derive(Debug, Clone)]
pub struct RunBudget {
    started: Instant,
    deadline: Instant,
    safety_margin: Duration,
    reserve: Duration,
}

impl RunBudget {
    pub fn new(total: Duration, safety_margin: Duration, reserve: Duration) -> Self {
        let started = Instant::now();
        Self {
            started,
            deadline: started + total,
            safety_margin,
            reserve,
        }
    }

    /// Time left before the run deadline.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Time since the run started.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// True once the deadline has passed.
    pub fn exhausted(&self) -> bool {
        self.remaining().is_zero()
    }

    /// True when the remaining budget has dropped below the reserve; skip
    /// lower-priority expansion work from this point on.
    pub fn reserve_reached(&self) -> bool {
        self.remaining() < self.reserve
    }

    /// Timeout to grant an external operation with the given nominal budget.
    ///
    /// Zero means the operation should not be started at all.
    pub fn op_timeout(&self, nominal: Duration) -> Duration {
        nominal.min(self.remaining().saturating_sub(self.safety_margin))
    }
}
