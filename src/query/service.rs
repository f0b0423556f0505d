//! Connection info lookups
//!
//! Reads the shared allocator state; never mutates it.

use crate::error::{AllocatorError, Result};
use crate::lifecycle::AllocatorState;
use crate::types::ConnectionInfo;
use std::env;
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::{debug, error};

/// Default environment variable holding the public host address
pub const PUBLIC_HOST_ENV: &str = "PUBLIC_HOST_IP";
/// Host reported when the variable is unset
pub const FALLBACK_HOST: &str = "localhost";

/// Source of the host clients should connect to
#[cfg_attr(test, mockall::automock)]
pub trait HostResolver: Send + Sync {
    fn resolve_host(&self) -> String;
}

/// Variable lookup used by [`EnvHostResolver`]
pub type VarLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Reads an environment variable on every call
#[derive(Clone)]
pub struct EnvHostResolver {
    key: String,
    fallback: String,
    lookup: VarLookup,
}

impl EnvHostResolver {
    pub fn new(key: impl Into<String>, fallback: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            fallback: fallback.into(),
            lookup: Arc::new(|key| env::var(key).ok()),
        }
    }

    /// Replace the process environment with another variable source
    pub fn with_lookup(
        mut self,
        lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.lookup = Arc::new(lookup);
        self
    }
}

impl fmt::Debug for EnvHostResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvHostResolver")
            .field("key", &self.key)
            .field("fallback", &self.fallback)
            .finish_non_exhaustive()
    }
}

impl Default for EnvHostResolver {
    fn default() -> Self {
        Self::new(PUBLIC_HOST_ENV, FALLBACK_HOST)
    }
}

impl HostResolver for EnvHostResolver {
    fn resolve_host(&self) -> String {
        match (self.lookup)(&self.key) {
            Some(host) if !host.trim().is_empty() => host,
            _ => self.fallback.clone(),
        }
    }
}

/// Always returns the same host
#[derive(Debug, Clone)]
pub struct StaticHostResolver(pub String);

impl HostResolver for StaticHostResolver {
    fn resolve_host(&self) -> String {
        self.0.clone()
    }
}

/// Read-only view used by clients to find their server
#[derive(Clone)]
pub struct QueryService {
    state: Arc<RwLock<AllocatorState>>,
    host_resolver: Arc<dyn HostResolver>,
}

impl QueryService {
    pub fn new(state: Arc<RwLock<AllocatorState>>, host_resolver: Arc<dyn HostResolver>) -> Self {
        Self {
            state,
            host_resolver,
        }
    }

    /// Host and port for a live match
    pub fn get_connection_info(&self, match_id: &str) -> Result<ConnectionInfo> {
        let port = {
            let state = self
                .state
                .read()
                .map_err(|_| AllocatorError::lock_poisoned("allocator state"))?;

            let record =
                state
                    .registry
                    .get(match_id)
                    .ok_or_else(|| AllocatorError::MatchNotFound {
                        match_id: match_id.to_string(),
                    })?;

            match state.pool.lookup(record.server_id) {
                Some(slot) => slot.port,
                None => {
                    error!(
                        "Match {} references server {} which is not in the pool",
                        match_id, record.server_id
                    );
                    return Err(AllocatorError::ServerNotFound {
                        server_id: record.server_id,
                    }
                    .into());
                }
            }
        };

        let host = self.host_resolver.resolve_host();
        debug!("Connection info for match {}: {}:{}", match_id, host, port);

        Ok(ConnectionInfo { host, port })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::as_allocator_error;
    use crate::pool::{ServerPool, SlotSpec};
    use crate::registry::MatchRegistry;
    use crate::utils::current_timestamp;
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn shared_state() -> Arc<RwLock<AllocatorState>> {
        let pool = ServerPool::new(&[
            SlotSpec { id: 1, port: 7777 },
            SlotSpec { id: 2, port: 7778 },
        ])
        .unwrap();
        Arc::new(RwLock::new(AllocatorState::new(pool, MatchRegistry::new())))
    }

    fn allocate(state: &Arc<RwLock<AllocatorState>>, match_id: &str) {
        let mut state = state.write().unwrap();
        let slot = state.pool.find_and_reserve(match_id).unwrap();
        state
            .registry
            .create(match_id, slot.id, current_timestamp())
            .unwrap();
    }

    #[test]
    fn test_connection_info_for_live_match() {
        let state = shared_state();
        allocate(&state, "m1");
        allocate(&state, "m2");

        let mut resolver = MockHostResolver::new();
        resolver
            .expect_resolve_host()
            .times(1)
            .returning(|| "203.0.113.7".to_string());

        let query = QueryService::new(state, Arc::new(resolver));
        let info = query.get_connection_info("m2").unwrap();
        assert_eq!(
            info,
            ConnectionInfo {
                host: "203.0.113.7".to_string(),
                port: 7778,
            }
        );
    }

    #[test]
    fn test_unknown_match() {
        let mut resolver = MockHostResolver::new();
        resolver.expect_resolve_host().never();

        let query = QueryService::new(shared_state(), Arc::new(resolver));
        let err = query.get_connection_info("ghost").unwrap_err();
        let allocator_error = as_allocator_error(&err).unwrap();
        assert_eq!(allocator_error.rpc_message(), "Match not found");
    }

    #[test]
    fn test_record_pointing_outside_pool() {
        let state = shared_state();
        state
            .write()
            .unwrap()
            .registry
            .create("orphan", 99, current_timestamp())
            .unwrap();

        let query = QueryService::new(state, Arc::new(StaticHostResolver("h".to_string())));
        let err = query.get_connection_info("orphan").unwrap_err();
        assert_eq!(
            as_allocator_error(&err),
            Some(&AllocatorError::ServerNotFound { server_id: 99 })
        );
    }

    #[test]
    fn test_env_resolver_falls_back() {
        let resolver = EnvHostResolver::new("MATCH_ALLOCATOR_TEST_UNSET_HOST", "localhost");
        assert_eq!(resolver.resolve_host(), "localhost");
    }

    #[test]
    fn test_env_resolver_reads_at_call_time() {
        let vars: Arc<Mutex<HashMap<String, String>>> = Arc::default();
        let source = vars.clone();
        let resolver = EnvHostResolver::new("PUBLIC_HOST_IP", "localhost")
            .with_lookup(move |key| source.lock().unwrap().get(key).cloned());

        assert_eq!(resolver.resolve_host(), "localhost");

        vars.lock()
            .unwrap()
            .insert("PUBLIC_HOST_IP".to_string(), "198.51.100.4".to_string());
        assert_eq!(resolver.resolve_host(), "198.51.100.4");

        // Blank values count as unset
        vars.lock()
            .unwrap()
            .insert("PUBLIC_HOST_IP".to_string(), "  ".to_string());
        assert_eq!(resolver.resolve_host(), "localhost");

        vars.lock().unwrap().remove("PUBLIC_HOST_IP");
        assert_eq!(resolver.resolve_host(), "localhost");
    }

    #[test]
    fn test_env_resolver_only_reads_its_key() {
        let resolver = EnvHostResolver::new("MATCH_HOST", "fallback.local").with_lookup(|key| {
            (key == "PUBLIC_HOST_IP").then(|| "198.51.100.9".to_string())
        });
        assert_eq!(resolver.resolve_host(), "fallback.local");
    }
}
