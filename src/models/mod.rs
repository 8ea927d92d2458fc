//! Core data models for squad rankings.

mod player;
mod snapshot;
mod squad;

pub use player::*;
pub use snapshot::*;
pub use squad::*;
