//! Incremental streaming protocol: typed run events over one ordered channel

mod channel;
mod events;

pub use channel::{spawn_heartbeat, EventChannel, ProgressBand};
pub use events::{
    EdgeSummary, FinalBrief, NodeSummary, PathSummary, Phase, RunEvent, RunUsage, SourceHealth,
};
