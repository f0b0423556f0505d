//! Event publishers for outbound lifecycle events

use crate::amqp::messages::{
    MessageEnvelope, MATCH_CREATED_ROUTING_KEY, MATCH_EVENTS_EXCHANGE,
    MATCH_TERMINATED_ROUTING_KEY, PLAYER_JOINED_ROUTING_KEY,
};
use crate::error::{AllocatorError, Result};
use crate::types::*;
use amqprs::{
    channel::{BasicPublishArguments, Channel, ExchangeDeclareArguments},
    BasicProperties,
};
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Trait for publishing match lifecycle events
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish_match_created(&self, event: MatchCreated) -> Result<()>;

    async fn publish_player_joined(&self, event: PlayerJoined) -> Result<()>;

    async fn publish_match_terminated(&self, event: MatchTerminated) -> Result<()>;

    /// Route a union event to its typed method
    async fn publish(&self, event: MatchEvent) -> Result<()> {
        match event {
            MatchEvent::MatchCreated(e) => self.publish_match_created(e).await,
            MatchEvent::PlayerJoined(e) => self.publish_player_joined(e).await,
            MatchEvent::MatchTerminated(e) => self.publish_match_terminated(e).await,
        }
    }
}

/// Configuration for event publishing
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub exchange: String,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            exchange: MATCH_EVENTS_EXCHANGE.to_string(),
            max_retries: 3,
            retry_delay_ms: 500,
        }
    }
}

/// AMQP-based event publisher implementation
pub struct AmqpEventPublisher {
    channel: Channel,
    config: PublisherConfig,
}

impl AmqpEventPublisher {
    /// Create a publisher and declare its exchange
    pub async fn new(channel: Channel, config: PublisherConfig) -> Result<Self> {
        let publisher = Self { channel, config };
        publisher.setup_exchange().await?;
        Ok(publisher)
    }

    async fn setup_exchange(&self) -> Result<()> {
        let args = ExchangeDeclareArguments::new(&self.config.exchange, "topic");
        self.channel.exchange_declare(args).await.map_err(|e| {
            AllocatorError::AmqpConnectionFailed {
                message: format!(
                    "Failed to declare exchange {}: {}",
                    self.config.exchange, e
                ),
            }
        })?;

        info!("Declared match events exchange {}", self.config.exchange);
        Ok(())
    }

    /// Publish with exponential backoff between attempts
    async fn publish_with_retry<T>(&self, envelope: &MessageEnvelope<T>) -> Result<()>
    where
        T: serde::Serialize + serde::de::DeserializeOwned,
    {
        let mut retry_count = 0;
        let mut delay = Duration::from_millis(self.config.retry_delay_ms);

        loop {
            match self.try_publish(envelope).await {
                Ok(_) => {
                    debug!(
                        "Published message {} with routing key {}",
                        envelope.correlation_id, envelope.routing_key
                    );
                    return Ok(());
                }
                Err(e) => {
                    retry_count += 1;
                    if retry_count > self.config.max_retries {
                        error!(
                            "Failed to publish message {} after {} retries: {}",
                            envelope.correlation_id, self.config.max_retries, e
                        );
                        return Err(e);
                    }

                    warn!(
                        "Publish attempt {} failed for message {}: {}. Retrying in {:?}",
                        retry_count, envelope.correlation_id, e, delay
                    );

                    sleep(delay).await;
                    delay = Duration::from_millis((delay.as_millis() as u64 * 2).min(5000));
                }
            }
        }
    }

    async fn try_publish<T>(&self, envelope: &MessageEnvelope<T>) -> Result<()>
    where
        T: serde::Serialize + serde::de::DeserializeOwned,
    {
        let payload = envelope.to_bytes()?;

        let args = BasicPublishArguments::new(&self.config.exchange, &envelope.routing_key);
        let mut properties = BasicProperties::default();
        properties
            .with_message_id(&envelope.correlation_id)
            .with_timestamp(envelope.timestamp.timestamp() as u64)
            .with_content_type("application/json");

        self.channel
            .basic_publish(properties, payload, args)
            .await
            .map_err(|e| AllocatorError::AmqpConnectionFailed {
                message: format!("Failed to publish message: {}", e),
            })?;

        Ok(())
    }
}

#[async_trait]
impl EventPublisher for AmqpEventPublisher {
    async fn publish_match_created(&self, event: MatchCreated) -> Result<()> {
        let envelope = MessageEnvelope::new(event, MATCH_CREATED_ROUTING_KEY.to_string());
        self.publish_with_retry(&envelope).await
    }

    async fn publish_player_joined(&self, event: PlayerJoined) -> Result<()> {
        let envelope = MessageEnvelope::new(event, PLAYER_JOINED_ROUTING_KEY.to_string());
        self.publish_with_retry(&envelope).await
    }

    async fn publish_match_terminated(&self, event: MatchTerminated) -> Result<()> {
        let envelope = MessageEnvelope::new(event, MATCH_TERMINATED_ROUTING_KEY.to_string());
        self.publish_with_retry(&envelope).await
    }
}

/// Publisher used when AMQP is disabled; events only reach the log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventPublisher;

#[async_trait]
impl EventPublisher for TracingEventPublisher {
    async fn publish_match_created(&self, event: MatchCreated) -> Result<()> {
        info!(
            match_id = %event.match_id,
            server_id = event.server_id,
            port = event.port,
            "match created"
        );
        Ok(())
    }

    async fn publish_player_joined(&self, event: PlayerJoined) -> Result<()> {
        info!(
            match_id = %event.match_id,
            user_id = %event.user_id,
            players = event.players.len(),
            "player joined"
        );
        Ok(())
    }

    async fn publish_match_terminated(&self, event: MatchTerminated) -> Result<()> {
        info!(
            match_id = %event.match_id,
            server_id = event.server_id,
            reason = %event.reason,
            "match terminated"
        );
        Ok(())
    }
}

/// Mock event publisher for testing
#[derive(Debug, Default)]
pub struct MockEventPublisher {
    published_events: std::sync::Mutex<Vec<String>>,
}

impl MockEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Published events as `Kind:match_id`, in order
    pub fn get_published_events(&self) -> Vec<String> {
        self.published_events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn clear_events(&self) {
        if let Ok(mut events) = self.published_events.lock() {
            events.clear();
        }
    }

    fn record(&self, kind: &str, match_id: &str) {
        if let Ok(mut events) = self.published_events.lock() {
            events.push(format!("{}:{}", kind, match_id));
        }
    }
}

#[async_trait]
impl EventPublisher for MockEventPublisher {
    async fn publish_match_created(&self, event: MatchCreated) -> Result<()> {
        self.record("MatchCreated", &event.match_id);
        Ok(())
    }

    async fn publish_player_joined(&self, event: PlayerJoined) -> Result<()> {
        self.record("PlayerJoined", &event.match_id);
        Ok(())
    }

    async fn publish_match_terminated(&self, event: MatchTerminated) -> Result<()> {
        self.record("MatchTerminated", &event.match_id);
        Ok(())
    }
}
