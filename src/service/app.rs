//! Main application state and service coordination
//!
//! This module contains the production AppState that wires the allocator
//! components together and owns the background tasks.

use crate::amqp::connection::{AmqpConfig, AmqpConnection};
use crate::amqp::handlers::{MatchedPartyConsumer, MatchedPartyHandler};
use crate::amqp::publisher::{
    AmqpEventPublisher, EventPublisher, PublisherConfig, TracingEventPublisher,
};
use crate::config::AppConfig;
use crate::error::{AllocatorError, Result as AllocatorResult};
use crate::host::{host_router, HostAdapter, HostApiState};
use crate::lifecycle::{
    spawn_event_forwarder, start_tick_task, EventDispatcher, MatchLifecycle, MatchManager,
};
use crate::metrics::health::HealthServerConfig;
use crate::metrics::{HealthServer, MetricsCollector, MetricsService};
use crate::pool::ServerPool;
use crate::query::{EnvHostResolver, QueryService};
use crate::registry::MatchRegistry;
use crate::service::health::ServiceProbe;
use crate::types::{MatchEvent, MatchId, MatchedPartyRequest};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("AMQP connection error: {message}")]
    AmqpConnection { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },

    #[error("Background task error: {message}")]
    BackgroundTask { message: String },
}

/// Turns matched-party messages into matches
struct ProductionPartyHandler {
    manager: Arc<MatchManager>,
    metrics_collector: Arc<MetricsCollector>,
}

#[async_trait]
impl MatchedPartyHandler for ProductionPartyHandler {
    async fn handle_matched_party(&self, request: MatchedPartyRequest) -> AllocatorResult<MatchId> {
        let start_time = Instant::now();
        let result = self.manager.create_match(request.match_id);

        self.metrics_collector.record_amqp_operation(
            "matched_party",
            result.is_ok(),
            start_time.elapsed(),
        );
        result
    }

    async fn handle_error(&self, error: AllocatorError, message_data: &[u8]) {
        match &error {
            AllocatorError::NoAvailableServer => {
                warn!("Matched party dropped: no available server")
            }
            _ => {
                let preview_len = std::cmp::min(100, message_data.len());
                error!(
                    "Matched party message failed: {} (message preview: {:?})",
                    error,
                    String::from_utf8_lossy(&message_data[..preview_len])
                );
            }
        }
    }
}

/// Main application state containing all service components
pub struct AppState {
    config: AppConfig,

    /// Allocation core
    manager: Arc<MatchManager>,

    /// Lookups for clients
    query: QueryService,

    /// Shared by health checks and the HTTP server
    probe: ServiceProbe,

    metrics_service: Arc<MetricsService>,

    /// Present only when AMQP is enabled
    amqp_connection: Option<Arc<AmqpConnection>>,
    party_consumer: Option<MatchedPartyConsumer>,

    /// Receiver for the event forwarder, taken at start
    event_receiver: Option<mpsc::UnboundedReceiver<MatchEvent>>,

    /// Stops the tick driver and the event forwarder
    shutdown_tx: broadcast::Sender<()>,

    background_tasks: Vec<JoinHandle<()>>,
}

impl AppState {
    /// Initialize the application with all dependencies
    pub async fn new(config: AppConfig) -> Result<Self, ServiceError> {
        info!("Initializing {} allocation service", config.service.name);
        info!(
            "Configuration: pool={} slots, max_match_duration={}s, amqp_enabled={}",
            config.pool.slots.len(),
            config.lifecycle.max_match_duration_seconds,
            config.amqp.enabled
        );

        let metrics_collector =
            Arc::new(
                MetricsCollector::new().map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to create metrics collector: {}", e),
                })?,
            );

        let (events, event_receiver) = EventDispatcher::channel();
        let manager = Arc::new(Self::initialize_manager(
            &config,
            events,
            metrics_collector.clone(),
        )?);

        let query = QueryService::new(
            manager.shared_state(),
            Arc::new(EnvHostResolver::new(
                config.query.public_host_env.clone(),
                config.query.fallback_host.clone(),
            )),
        );

        let amqp_connection = if config.amqp.enabled {
            Some(Self::initialize_amqp(&config).await?)
        } else {
            info!("AMQP disabled; events go to the log only");
            None
        };

        let probe = ServiceProbe::new(config.service.name.clone(), manager.clone())
            .with_amqp(amqp_connection.clone(), config.amqp.enabled);

        let metrics_service = Self::initialize_http(
            &config,
            manager.clone(),
            query.clone(),
            probe.clone(),
            metrics_collector,
        );

        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            config,
            manager,
            query,
            probe,
            metrics_service,
            amqp_connection,
            party_consumer: None,
            event_receiver: Some(event_receiver),
            shutdown_tx,
            background_tasks: Vec::new(),
        })
    }

    fn initialize_manager(
        config: &AppConfig,
        events: EventDispatcher,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Result<MatchManager, ServiceError> {
        let pool =
            ServerPool::new(&config.pool.slots).map_err(|e| ServiceError::Configuration {
                message: format!("Invalid server pool: {}", e),
            })?;

        Ok(MatchManager::new(pool, MatchRegistry::new())
            .with_max_match_duration(config.max_match_duration())
            .with_events(events)
            .with_metrics(metrics_collector))
    }

    fn initialize_http(
        config: &AppConfig,
        manager: Arc<MatchManager>,
        query: QueryService,
        probe: ServiceProbe,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Arc<MetricsService> {
        let adapter = HostAdapter::new(manager.clone(), query);
        let routes = host_router(HostApiState {
            adapter,
            manager,
            metrics_collector: metrics_collector.clone(),
        });

        let health_config = HealthServerConfig {
            port: config.service.http_port,
            host: "0.0.0.0".to_string(),
        };
        let health_server = Arc::new(
            HealthServer::new(health_config, metrics_collector.clone())
                .with_probe(probe)
                .with_routes(routes),
        );

        Arc::new(MetricsService::new(metrics_collector, health_server))
    }

    async fn initialize_amqp(config: &AppConfig) -> Result<Arc<AmqpConnection>, ServiceError> {
        let mut amqp_config =
            AmqpConfig::from_url(&config.amqp.url).map_err(|e| ServiceError::Configuration {
                message: format!("Failed to parse AMQP URL: {}", e),
            })?;
        amqp_config.max_retries = config.amqp.max_retry_attempts;
        amqp_config.retry_delay_ms = config.amqp.retry_delay_ms;
        amqp_config.connection_timeout_ms = config.amqp_connection_timeout().as_millis() as u64;

        info!(
            "Connecting to AMQP broker at {}:{}",
            amqp_config.host, amqp_config.port
        );

        let connection =
            AmqpConnection::new(amqp_config)
                .await
                .map_err(|e| ServiceError::AmqpConnection {
                    message: format!("Failed to connect to AMQP: {}", e),
                })?;

        Ok(Arc::new(connection))
    }

    /// Start the HTTP server, event forwarding, the tick driver and AMQP intake
    pub async fn start(&mut self) -> Result<(), ServiceError> {
        info!("Starting {} service", self.config.service.name);

        self.start_http_server().await;
        self.start_event_forwarder().await?;

        self.background_tasks.push(start_tick_task(
            self.manager.clone(),
            self.config.tick_interval(),
            self.shutdown_tx.subscribe(),
        ));

        if let Some(connection) = self.amqp_connection.clone() {
            self.start_party_consumer(&connection).await?;
        }

        self.probe.set_running(true);
        info!("✅ {} service started", self.config.service.name);
        Ok(())
    }

    async fn start_http_server(&mut self) {
        let metrics_service = self.metrics_service.clone();
        let port = self.config.service.http_port;

        let handle = tokio::spawn(async move {
            if let Err(e) = metrics_service.start().await {
                error!("HTTP server failed: {}", e);
            }
        });
        self.background_tasks.push(handle);

        // Give the listener a moment to bind
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        info!("✅ HTTP server started on port {}", port);
    }

    async fn start_event_forwarder(&mut self) -> Result<(), ServiceError> {
        let Some(receiver) = self.event_receiver.take() else {
            return Ok(());
        };

        let publisher: Arc<dyn EventPublisher> = match &self.amqp_connection {
            Some(connection) => {
                let channel =
                    connection
                        .open_channel()
                        .await
                        .map_err(|e| ServiceError::AmqpConnection {
                            message: format!("Failed to open publisher channel: {}", e),
                        })?;
                let publisher_config = PublisherConfig {
                    exchange: self.config.amqp.events_exchange.clone(),
                    max_retries: self.config.amqp.max_retry_attempts,
                    retry_delay_ms: self.config.amqp.retry_delay_ms,
                };
                Arc::new(
                    AmqpEventPublisher::new(channel, publisher_config)
                        .await
                        .map_err(|e| ServiceError::AmqpConnection {
                            message: format!("Failed to create event publisher: {}", e),
                        })?,
                )
            }
            None => Arc::new(TracingEventPublisher),
        };

        self.background_tasks
            .push(spawn_event_forwarder(
                receiver,
                publisher,
                self.shutdown_tx.subscribe(),
            ));
        Ok(())
    }

    async fn start_party_consumer(
        &mut self,
        connection: &AmqpConnection,
    ) -> Result<(), ServiceError> {
        let channel = connection
            .open_channel()
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to open consumer channel: {}", e),
            })?;

        let handler = Arc::new(ProductionPartyHandler {
            manager: self.manager.clone(),
            metrics_collector: self.metrics_service.collector(),
        });
        let consumer = MatchedPartyConsumer::new(handler, channel);
        consumer
            .start_consuming(&self.config.amqp.matched_queue)
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to start matched-party consumer: {}", e),
            })?;

        self.party_consumer = Some(consumer);
        info!(
            "✅ Consuming matched parties from {}",
            self.config.amqp.matched_queue
        );
        Ok(())
    }

    /// Perform graceful shutdown
    pub async fn shutdown(&mut self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of {}", self.config.service.name);
        self.probe.set_running(false);

        if let Some(consumer) = self.party_consumer.take() {
            if let Err(e) = consumer.stop_consuming().await {
                warn!("Failed to stop AMQP consumer: {}", e);
            }
        }

        let _ = self.shutdown_tx.send(());

        if let Err(e) = self.metrics_service.stop().await {
            warn!("Failed to stop HTTP server: {}", e);
        }

        self.stop_background_tasks().await;

        let final_stats = self
            .manager
            .get_stats()
            .map_err(|e| ServiceError::BackgroundTask {
                message: format!("Failed to get final stats: {}", e),
            })?;
        info!("Final service statistics: {:?}", final_stats);

        info!("✅ {} shutdown completed", self.config.service.name);
        Ok(())
    }

    /// Wait for background tasks, aborting any that outlive the shutdown timeout
    async fn stop_background_tasks(&mut self) {
        let timeout = self.config.shutdown_timeout();

        for handle in self.background_tasks.drain(..) {
            if handle.is_finished() {
                continue;
            }
            let abort = handle.abort_handle();
            match tokio::time::timeout(timeout, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) if e.is_cancelled() => {}
                Ok(Err(e)) => warn!("Background task ended with error: {}", e),
                Err(_) => {
                    warn!("Background task did not stop within {:?}, aborting", timeout);
                    abort.abort();
                }
            }
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.probe.is_running()
    }

    pub fn manager(&self) -> Arc<MatchManager> {
        self.manager.clone()
    }

    pub fn query(&self) -> &QueryService {
        &self.query
    }

    pub fn probe(&self) -> &ServiceProbe {
        &self.probe
    }

    pub fn metrics_service(&self) -> Arc<MetricsService> {
        self.metrics_service.clone()
    }
}
