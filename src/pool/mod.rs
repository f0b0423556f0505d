//! Server pool management
//!
//! This module owns the fixed set of dedicated server slots and the policy
//! used to pick a free one.

pub mod selection;
pub mod server_pool;

// Re-export commonly used types
pub use selection::{FirstFreeSelector, SlotSelector};
pub use server_pool::{ServerPool, SlotSpec};
