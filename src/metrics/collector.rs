//! Metrics collection using Prometheus
//!
//! This module provides metrics collection for the match-allocator service
//! using Prometheus metrics.

use crate::lifecycle::manager::MatchManagerStats;
use crate::types::{ServerId, TerminationReason};
use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Main metrics collector for the allocation service
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Server pool metrics
    pool_metrics: PoolMetrics,

    /// Match lifecycle metrics
    match_metrics: MatchMetrics,

    /// Performance metrics
    performance_metrics: PerformanceMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Total AMQP messages processed
    pub amqp_messages_total: IntCounterVec,

    /// AMQP message processing errors
    pub amqp_errors_total: IntCounterVec,

    /// RPC calls by procedure and outcome
    pub rpc_requests_total: IntCounterVec,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,

    /// Component health status
    pub component_health: IntGaugeVec,
}

/// Server pool metrics
#[derive(Clone)]
pub struct PoolMetrics {
    /// Number of slots in the pool
    pub pool_size: IntGauge,

    /// Slots currently assigned to a match
    pub busy_slots: IntGauge,

    /// Create requests refused because every slot was busy
    pub allocation_failures_total: IntCounter,

    /// Reservations per slot
    pub slot_assignments_total: IntCounterVec,
}

/// Match lifecycle metrics
#[derive(Clone)]
pub struct MatchMetrics {
    /// Matches currently registered
    pub active_matches: IntGauge,

    /// Total matches created
    pub matches_created_total: IntCounter,

    /// Total matches terminated by reason
    pub matches_terminated_total: IntCounterVec,

    /// Join attempts by result
    pub joins_total: IntCounterVec,

    /// How long matches held their server
    pub match_duration_seconds: Histogram,
}

/// Performance metrics
#[derive(Clone)]
pub struct PerformanceMetrics {
    /// Lifecycle operation durations
    pub lifecycle_operation_duration: HistogramVec,

    /// AMQP operation durations
    pub amqp_operation_duration: HistogramVec,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let pool_metrics = PoolMetrics::new(&registry)?;
        let match_metrics = MatchMetrics::new(&registry)?;
        let performance_metrics = PerformanceMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            pool_metrics,
            match_metrics,
            performance_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    pub fn pool(&self) -> &PoolMetrics {
        &self.pool_metrics
    }

    pub fn matches(&self) -> &MatchMetrics {
        &self.match_metrics
    }

    pub fn performance(&self) -> &PerformanceMetrics {
        &self.performance_metrics
    }

    /// Refresh gauges from manager stats
    pub fn update_from_manager_stats(&self, stats: &MatchManagerStats) {
        self.update_occupancy(stats.busy_slots, stats.pool_size, stats.active_matches);
    }

    /// Set the pool occupancy gauges
    pub fn update_occupancy(&self, busy_slots: usize, pool_size: usize, active_matches: usize) {
        self.pool_metrics.busy_slots.set(busy_slots as i64);
        self.pool_metrics.pool_size.set(pool_size as i64);
        self.match_metrics.active_matches.set(active_matches as i64);
    }

    /// Record a successful allocation
    pub fn record_match_created(&self, server_id: ServerId) {
        let server_label = server_id.to_string();
        self.match_metrics.matches_created_total.inc();
        self.pool_metrics
            .slot_assignments_total
            .with_label_values(&[server_label.as_str()])
            .inc();
    }

    /// Record a create request that found no free slot
    pub fn record_allocation_failure(&self) {
        self.pool_metrics.allocation_failures_total.inc();
    }

    /// Record a join attempt; `result` is "accepted", "full" or "not_found"
    pub fn record_join(&self, result: &str) {
        self.match_metrics
            .joins_total
            .with_label_values(&[result])
            .inc();
    }

    /// Record a match teardown and how long it held its server
    pub fn record_match_terminated(&self, reason: TerminationReason, held_for: Duration) {
        let reason_str = match reason {
            TerminationReason::Expired => "expired",
            TerminationReason::Requested => "requested",
        };

        self.match_metrics
            .matches_terminated_total
            .with_label_values(&[reason_str])
            .inc();
        self.match_metrics
            .match_duration_seconds
            .observe(held_for.as_secs_f64());
    }

    /// Record lifecycle operation duration
    pub fn record_lifecycle_operation(&self, operation: &str, duration: Duration) {
        self.performance_metrics
            .lifecycle_operation_duration
            .with_label_values(&[operation])
            .observe(duration.as_secs_f64());
    }

    /// Record an RPC invocation
    pub fn record_rpc(&self, procedure: &str, success: bool) {
        let status = if success { "success" } else { "error" };
        self.service_metrics
            .rpc_requests_total
            .with_label_values(&[procedure, status])
            .inc();
    }

    /// Record AMQP operation
    pub fn record_amqp_operation(&self, operation: &str, success: bool, duration: Duration) {
        let status = if success { "success" } else { "error" };

        self.service_metrics
            .amqp_messages_total
            .with_label_values(&[operation, status])
            .inc();

        if !success {
            self.service_metrics
                .amqp_errors_total
                .with_label_values(&[operation])
                .inc();
        }

        self.performance_metrics
            .amqp_operation_duration
            .with_label_values(&[operation, status])
            .observe(duration.as_secs_f64());
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }

    /// Update component health
    pub fn update_component_health(&self, component: &str, healthy: bool) {
        let status = if healthy { 1 } else { 0 };
        self.service_metrics
            .component_health
            .with_label_values(&[component])
            .set(status);
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::new()
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get the elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds = IntGauge::new(
            "match_allocator_uptime_seconds",
            "Service uptime in seconds",
        )?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let amqp_messages_total = IntCounterVec::new(
            Opts::new(
                "match_allocator_amqp_messages_total",
                "Total AMQP messages processed",
            ),
            &["operation", "status"],
        )?;
        registry.register(Box::new(amqp_messages_total.clone()))?;

        let amqp_errors_total = IntCounterVec::new(
            Opts::new("match_allocator_amqp_errors_total", "Total AMQP errors"),
            &["operation"],
        )?;
        registry.register(Box::new(amqp_errors_total.clone()))?;

        let rpc_requests_total = IntCounterVec::new(
            Opts::new("match_allocator_rpc_requests_total", "Total RPC calls"),
            &["procedure", "status"],
        )?;
        registry.register(Box::new(rpc_requests_total.clone()))?;

        let health_status = IntGauge::new(
            "match_allocator_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        let component_health = IntGaugeVec::new(
            Opts::new(
                "match_allocator_component_health",
                "Component health status",
            ),
            &["component"],
        )?;
        registry.register(Box::new(component_health.clone()))?;

        Ok(Self {
            uptime_seconds,
            amqp_messages_total,
            amqp_errors_total,
            rpc_requests_total,
            health_status,
            component_health,
        })
    }
}

impl PoolMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let pool_size = IntGauge::new("match_allocator_pool_size", "Number of server slots")?;
        registry.register(Box::new(pool_size.clone()))?;

        let busy_slots = IntGauge::new(
            "match_allocator_busy_slots",
            "Server slots assigned to a match",
        )?;
        registry.register(Box::new(busy_slots.clone()))?;

        let allocation_failures_total = IntCounter::new(
            "match_allocator_allocation_failures_total",
            "Create requests refused with no available server",
        )?;
        registry.register(Box::new(allocation_failures_total.clone()))?;

        let slot_assignments_total = IntCounterVec::new(
            Opts::new(
                "match_allocator_slot_assignments_total",
                "Reservations per server slot",
            ),
            &["server_id"],
        )?;
        registry.register(Box::new(slot_assignments_total.clone()))?;

        Ok(Self {
            pool_size,
            busy_slots,
            allocation_failures_total,
            slot_assignments_total,
        })
    }
}

impl MatchMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let active_matches = IntGauge::new(
            "match_allocator_active_matches",
            "Number of registered matches",
        )?;
        registry.register(Box::new(active_matches.clone()))?;

        let matches_created_total = IntCounter::new(
            "match_allocator_matches_created_total",
            "Total matches created",
        )?;
        registry.register(Box::new(matches_created_total.clone()))?;

        let matches_terminated_total = IntCounterVec::new(
            Opts::new(
                "match_allocator_matches_terminated_total",
                "Total matches terminated",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(matches_terminated_total.clone()))?;

        let joins_total = IntCounterVec::new(
            Opts::new("match_allocator_joins_total", "Join attempts by result"),
            &["result"],
        )?;
        registry.register(Box::new(joins_total.clone()))?;

        let match_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "match_allocator_match_duration_seconds",
                "Time a match held its server",
            )
            .buckets(vec![
                30.0, 60.0, 120.0, 300.0, 600.0, 900.0, 1200.0, 1800.0, 3600.0,
            ]),
        )?;
        registry.register(Box::new(match_duration_seconds.clone()))?;

        Ok(Self {
            active_matches,
            matches_created_total,
            matches_terminated_total,
            joins_total,
            match_duration_seconds,
        })
    }
}

impl PerformanceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let lifecycle_operation_duration = HistogramVec::new(
            HistogramOpts::new(
                "match_allocator_lifecycle_operation_duration_seconds",
                "Lifecycle operation duration",
            )
            .buckets(vec![0.00001, 0.0001, 0.001, 0.005, 0.01, 0.05, 0.1]),
            &["operation"],
        )?;
        registry.register(Box::new(lifecycle_operation_duration.clone()))?;

        let amqp_operation_duration = HistogramVec::new(
            HistogramOpts::new(
                "match_allocator_amqp_operation_duration_seconds",
                "AMQP operation duration",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["operation", "status"],
        )?;
        registry.register(Box::new(amqp_operation_duration.clone()))?;

        Ok(Self {
            lifecycle_operation_duration,
            amqp_operation_duration,
        })
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new().expect("Failed to create default metrics collector")
    }
}
