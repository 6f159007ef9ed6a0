//! Anchor resolution and multi-anchor bridge pathfinding

mod anchor;
mod bridge;

pub use anchor::{token_overlap, Anchor};
pub use bridge::{resolve_path, BridgePath};
