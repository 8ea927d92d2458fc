//! # Squad Rankings
//!
//! Builds a ranking snapshot of every squad from the remote player stats API.
//!
//! ## Architecture
//!
//! - **fetch**: HTTP client for the stats API and the courtesy throttle
//! - **normalize**: Tolerant conversion of raw player payloads into numbers
//! - **aggregate**: Per-squad means and sums
//! - **pipeline**: Run orchestration and counters
//! - **storage**: Atomic snapshot persistence
//! - **models**: Core data structures (squads, players, snapshot)
//! - **config**: Configuration loading and validation

pub mod aggregate;
pub mod config;
pub mod fetch;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod storage;

pub use models::*;
