//! Tunable constants for a discovery run
//!
//! The similarity floor and budget thresholds are load-bearing but not
//! sacred; they are configuration, validated by the scenario tests.

use std::time::Duration;

/// Configuration for discovery runs.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Minimum token-overlap score for a fuzzy anchor-to-node match
    pub similarity_floor: f32,
    /// Overall wall-clock budget for one run
    pub run_budget: Duration,
    /// Nominal timeout for a single external call (search, lookup, plan, synthesize)
    pub op_timeout: Duration,
    /// Subtracted from the remaining budget when computing per-op timeouts
    pub safety_margin: Duration,
    /// Below this remaining budget, expansion work is skipped in favor of synthesis
    pub reserve: Duration,
    /// Sessions whose run has been active longer than this are swept and cancelled
    pub stale_after: Duration,
    /// Interval between heartbeat status events during quiet phases
    pub heartbeat_interval: Duration,
    /// Candidate limit passed to evidence-source searches
    pub search_limit: usize,
    /// How many top-scoring targets the expansion phase looks up
    pub expansion_limit: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            similarity_floor: 0.55,
            run_budget: Duration::from_secs(90),
            op_timeout: Duration::from_secs(15),
            safety_margin: Duration::from_secs(2),
            reserve: Duration::from_secs(10),
            stale_after: Duration::from_secs(15 * 60),
            heartbeat_interval: Duration::from_secs(5),
            search_limit: 10,
            expansion_limit: 4,
        }
    }
}

impl DiscoveryConfig {
    /// A tight budget profile for tests: everything in milliseconds.
    pub fn for_tests() -> Self {
        Self {
            run_budget: Duration::from_secs(5),
            op_timeout: Duration::from_millis(500),
            safety_margin: Duration::from_millis(10),
            reserve: Duration::from_millis(250),
            heartbeat_interval: Duration::from_millis(100),
            ..Self::default()
        }
    }
}
