//! Run session lifecycle: one active run per session key

mod budget;
mod manager;

pub use budget::RunBudget;
pub use manager::{CancellationToken, RunStatus, SessionError, SessionManager};
