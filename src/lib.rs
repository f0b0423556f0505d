//! Match Allocator - dedicated game-server allocation service
//!
//! This crate assigns servers from a fixed pool to matches, tracks match
//! membership and lifetime, and answers connection-info lookups. Hosts drive
//! it through lifecycle hooks, an RPC surface, HTTP, or AMQP.

pub mod amqp;
pub mod config;
pub mod error;
pub mod host;
pub mod lifecycle;
pub mod metrics;
pub mod pool;
pub mod query;
pub mod registry;
pub mod service;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{AllocatorError, Result};
pub use types::*;

// Re-export key components
pub use amqp::publisher::EventPublisher;
pub use host::HostAdapter;
pub use lifecycle::{MatchLifecycle, MatchManager};
pub use pool::{ServerPool, SlotSpec};
pub use query::QueryService;
pub use registry::MatchRegistry;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
