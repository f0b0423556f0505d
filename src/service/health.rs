//! Health check endpoints and monitoring
//!
//! This module provides health check functionality for the match-allocator
//! service, including readiness and liveness probes.

use crate::amqp::AmqpConnection;
use crate::lifecycle::MatchManager;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error};

/// Health check status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Gauge value used by the health metric
    pub fn as_gauge(&self) -> u8 {
        match self {
            HealthStatus::Healthy => 2,
            HealthStatus::Degraded => 1,
            HealthStatus::Unhealthy => 0,
        }
    }

    fn worst(self, other: HealthStatus) -> HealthStatus {
        match (self, other) {
            (HealthStatus::Unhealthy, _) | (_, HealthStatus::Unhealthy) => HealthStatus::Unhealthy,
            (HealthStatus::Degraded, _) | (_, HealthStatus::Degraded) => HealthStatus::Degraded,
            _ => HealthStatus::Healthy,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "✅ healthy"),
            HealthStatus::Degraded => write!(f, "⚠️  degraded"),
            HealthStatus::Unhealthy => write!(f, "❌ unhealthy"),
        }
    }
}

/// Everything a health check looks at
#[derive(Clone)]
pub struct ServiceProbe {
    pub service_name: String,
    pub manager: Arc<MatchManager>,
    pub amqp_connection: Option<Arc<AmqpConnection>>,
    pub amqp_enabled: bool,
    running: Arc<AtomicBool>,
    started_at: Instant,
}

impl ServiceProbe {
    pub fn new(service_name: impl Into<String>, manager: Arc<MatchManager>) -> Self {
        Self {
            service_name: service_name.into(),
            manager,
            amqp_connection: None,
            amqp_enabled: false,
            running: Arc::new(AtomicBool::new(false)),
            started_at: Instant::now(),
        }
    }

    pub fn with_amqp(mut self, connection: Option<Arc<AmqpConnection>>, enabled: bool) -> Self {
        self.amqp_connection = connection;
        self.amqp_enabled = enabled;
        self
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Overall service status
    pub status: HealthStatus,
    pub service: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Detailed component checks
    pub checks: Vec<ComponentCheck>,
    pub stats: ServiceStats,
}

/// Individual component health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCheck {
    pub name: String,
    pub status: HealthStatus,
    /// Optional error message if not healthy
    pub message: Option<String>,
    /// Check duration in milliseconds
    pub duration_ms: u64,
}

/// Service statistics for health reporting
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceStats {
    pub pool_size: usize,
    pub busy_slots: usize,
    pub active_matches: usize,
    pub matches_created: u64,
    pub matches_terminated: u64,
    pub allocation_failures: u64,
    pub uptime_seconds: u64,
}

impl HealthCheck {
    /// Perform a comprehensive health check of the service
    pub fn check(probe: &ServiceProbe) -> Result<Self> {
        let mut checks = vec![
            Self::check_service_running(probe),
            Self::check_match_manager(probe),
        ];
        if probe.amqp_enabled {
            checks.push(Self::check_amqp_health(probe));
        }

        let status = checks
            .iter()
            .fold(HealthStatus::Healthy, |acc, check| acc.worst(check.status));

        Ok(HealthCheck {
            status,
            service: probe.service_name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono::Utc::now(),
            checks,
            stats: Self::gather_service_stats(probe),
        })
    }

    /// Simple liveness check - just verify service is running
    pub fn liveness_check(probe: &ServiceProbe) -> Result<HealthStatus> {
        if probe.is_running() {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Unhealthy)
        }
    }

    /// Readiness check - verify service can handle requests
    pub fn readiness_check(probe: &ServiceProbe) -> Result<HealthStatus> {
        if !probe.is_running() {
            return Ok(HealthStatus::Unhealthy);
        }

        let mut status = Self::check_match_manager(probe).status;
        if probe.amqp_enabled {
            status = status.worst(Self::check_amqp_health(probe).status);
        }
        Ok(status)
    }

    fn check_service_running(probe: &ServiceProbe) -> ComponentCheck {
        let start = Instant::now();

        let (status, message) = if probe.is_running() {
            (HealthStatus::Healthy, None)
        } else {
            (
                HealthStatus::Unhealthy,
                Some("Service is not running".to_string()),
            )
        };

        ComponentCheck {
            name: "service_running".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Stats must be readable and pool/registry must agree
    fn check_match_manager(probe: &ServiceProbe) -> ComponentCheck {
        let start = Instant::now();

        let (status, message) = match probe.manager.get_stats() {
            Ok(stats) => match probe.manager.check_consistency() {
                Ok(()) if stats.busy_slots == stats.pool_size => (
                    HealthStatus::Degraded,
                    Some("All servers are busy".to_string()),
                ),
                Ok(()) => (HealthStatus::Healthy, None),
                Err(e) => {
                    error!("Allocator state is inconsistent: {}", e);
                    (HealthStatus::Unhealthy, Some(e.to_string()))
                }
            },
            Err(e) => {
                error!("Match manager stats check failed: {}", e);
                (
                    HealthStatus::Unhealthy,
                    Some(format!("Stats check failed: {}", e)),
                )
            }
        };

        ComponentCheck {
            name: "match_manager".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    fn check_amqp_health(probe: &ServiceProbe) -> ComponentCheck {
        let start = Instant::now();

        let (status, message) = match &probe.amqp_connection {
            Some(connection) if connection.is_alive() => (HealthStatus::Healthy, None),
            Some(_) => (
                HealthStatus::Degraded,
                Some("AMQP connection is closed".to_string()),
            ),
            None => (
                HealthStatus::Degraded,
                Some("AMQP enabled but not connected".to_string()),
            ),
        };

        ComponentCheck {
            name: "amqp_connection".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    fn gather_service_stats(probe: &ServiceProbe) -> ServiceStats {
        match probe.manager.get_stats() {
            Ok(stats) => ServiceStats {
                pool_size: stats.pool_size,
                busy_slots: stats.busy_slots,
                active_matches: stats.active_matches,
                matches_created: stats.matches_created,
                matches_terminated: stats.matches_terminated,
                allocation_failures: stats.allocation_failures,
                uptime_seconds: probe.uptime_seconds(),
            },
            Err(e) => {
                debug!("Failed to get manager stats for health check: {}", e);
                ServiceStats {
                    uptime_seconds: probe.uptime_seconds(),
                    ..ServiceStats::default()
                }
            }
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize health check: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::MatchLifecycle;
    use crate::pool::{ServerPool, SlotSpec};
    use crate::registry::MatchRegistry;

    fn probe() -> ServiceProbe {
        let manager = Arc::new(MatchManager::new(
            ServerPool::new(&[SlotSpec { id: 1, port: 7777 }, SlotSpec { id: 2, port: 7778 }])
                .unwrap(),
            MatchRegistry::new(),
        ));
        ServiceProbe::new("match-allocator", manager)
    }

    #[test]
    fn test_not_running_is_unhealthy() {
        let probe = probe();
        assert_eq!(
            HealthCheck::liveness_check(&probe).unwrap(),
            HealthStatus::Unhealthy
        );
        assert_eq!(
            HealthCheck::check(&probe).unwrap().status,
            HealthStatus::Unhealthy
        );
    }

    #[test]
    fn test_running_with_free_servers_is_healthy() {
        let probe = probe();
        probe.set_running(true);

        let health = HealthCheck::check(&probe).unwrap();
        assert_eq!(health.status, HealthStatus::Healthy);
        assert_eq!(health.stats.pool_size, 2);
        assert_eq!(health.checks.len(), 2);
        assert!(health.to_json().unwrap().contains("match_manager"));
    }

    #[test]
    fn test_exhausted_pool_is_degraded() {
        let probe = probe();
        probe.set_running(true);
        probe.manager.create_match(None).unwrap();
        probe.manager.create_match(None).unwrap();

        assert_eq!(
            HealthCheck::readiness_check(&probe).unwrap(),
            HealthStatus::Degraded
        );
    }

    #[test]
    fn test_enabled_amqp_without_connection_is_degraded() {
        let probe = probe().with_amqp(None, true);
        probe.set_running(true);

        let health = HealthCheck::check(&probe).unwrap();
        assert_eq!(health.status, HealthStatus::Degraded);
        assert_eq!(health.checks.len(), 3);
    }

    #[test]
    fn test_gauge_values() {
        assert_eq!(HealthStatus::Healthy.as_gauge(), 2);
        assert_eq!(HealthStatus::Degraded.as_gauge(), 1);
        assert_eq!(HealthStatus::Unhealthy.as_gauge(), 0);
    }
}
