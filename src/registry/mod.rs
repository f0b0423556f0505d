//! Match registry
//!
//! Owns every live `MatchRecord`, keyed by match id.

pub mod match_registry;

pub use match_registry::MatchRegistry;
