//! Read-only queries over the allocator state

pub mod service;

pub use service::{
    EnvHostResolver, HostResolver, QueryService, StaticHostResolver, FALLBACK_HOST,
    PUBLIC_HOST_ENV, VarLookup,
};
