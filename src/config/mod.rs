//! Configuration management for the match-allocator service
//!
//! This module handles configuration loading from TOML files and environment
//! variables, validation, and default values.

pub mod app;

// Re-export commonly used types
pub use app::{
    parse_server_pool, validate_config, AmqpSettings, AppConfig, LifecycleSettings, PoolSettings,
    QuerySettings, ServiceSettings,
};
