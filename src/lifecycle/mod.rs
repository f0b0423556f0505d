//! Match lifecycle: create, join, tick, terminate
//!
//! The `MatchManager` owns the pool and registry and is the only writer of
//! either.

pub mod driver;
pub mod events;
pub mod manager;

pub use driver::start_tick_task;
pub use events::{spawn_event_forwarder, EventDispatcher};
pub use manager::{
    AllocatorState, MatchLifecycle, MatchManager, MatchManagerStats, DEFAULT_MAX_MATCH_DURATION,
};
