//! AMQP consumer for matched-party messages
//!
//! Each message on the matched-party queue asks for one match to be created.
//! Messages are acked once handled, whether or not a server was available.

use crate::amqp::messages::MessageUtils;
use crate::error::{as_allocator_error, AllocatorError, Result};
use crate::types::{MatchId, MatchedPartyRequest};
use amqprs::{
    channel::{
        BasicAckArguments, BasicCancelArguments, BasicConsumeArguments, Channel,
        QueueDeclareArguments,
    },
    consumer::AsyncConsumer,
    BasicProperties, Deliver,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Trait defining the interface for handling matched-party messages
#[async_trait]
pub trait MatchedPartyHandler: Send + Sync {
    /// Allocate a match for a matched party
    async fn handle_matched_party(&self, request: MatchedPartyRequest) -> Result<MatchId>;

    /// Handle processing errors
    async fn handle_error(&self, error: AllocatorError, message_data: &[u8]);
}

/// Parse one delivery and hand it to `handler`
pub async fn process_matched_party(
    handler: &dyn MatchedPartyHandler,
    content: &[u8],
) -> Result<MatchId> {
    let request = MessageUtils::deserialize_matched_party(content)?;
    debug!("Matched party request parsed - match_id: {:?}", request.match_id);
    handler.handle_matched_party(request).await
}

/// Consumer for the matched-party queue
pub struct MatchedPartyConsumer {
    handler: Arc<dyn MatchedPartyHandler>,
    channel: Channel,
    consumer_tag: String,
}

impl MatchedPartyConsumer {
    pub fn new(handler: Arc<dyn MatchedPartyHandler>, channel: Channel) -> Self {
        let consumer_tag = format!("allocator-consumer-{}", uuid::Uuid::new_v4());

        Self {
            handler,
            channel,
            consumer_tag,
        }
    }

    /// Declare the queue and start consuming from it
    pub async fn start_consuming(&self, queue_name: &str) -> Result<()> {
        self.channel
            .queue_declare(QueueDeclareArguments::new(queue_name))
            .await
            .map_err(|e| AllocatorError::AmqpConnectionFailed {
                message: format!("Failed to declare queue {}: {}", queue_name, e),
            })?;

        let args = BasicConsumeArguments::new(queue_name, &self.consumer_tag);

        self.channel
            .basic_consume(PartyConsumer::new(self.handler.clone()), args)
            .await
            .map_err(|e| AllocatorError::AmqpConnectionFailed {
                message: format!("Failed to start consuming: {}", e),
            })?;

        info!("Started consuming messages from queue: {}", queue_name);
        Ok(())
    }

    pub async fn stop_consuming(&self) -> Result<()> {
        let args = BasicCancelArguments::new(&self.consumer_tag);

        self.channel.basic_cancel(args).await.map_err(|e| {
            AllocatorError::AmqpConnectionFailed {
                message: format!("Failed to stop consuming: {}", e),
            }
        })?;

        info!("Stopped consuming messages");
        Ok(())
    }
}

struct PartyConsumer {
    handler: Arc<dyn MatchedPartyHandler>,
}

impl PartyConsumer {
    fn new(handler: Arc<dyn MatchedPartyHandler>) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl AsyncConsumer for PartyConsumer {
    async fn consume(
        &mut self,
        channel: &Channel,
        deliver: Deliver,
        _basic_properties: BasicProperties,
        content: Vec<u8>,
    ) {
        let delivery_tag = deliver.delivery_tag();
        let start_time = std::time::Instant::now();

        debug!(
            "AMQP message received - delivery_tag: {}, size: {} bytes",
            delivery_tag,
            content.len()
        );

        match process_matched_party(self.handler.as_ref(), &content).await {
            Ok(match_id) => {
                info!(
                    "Matched party allocated match {} - delivery_tag: {}, processing_time: {:.2}ms",
                    match_id,
                    delivery_tag,
                    start_time.elapsed().as_secs_f64() * 1000.0
                );
            }
            Err(e) => {
                error!(
                    "Matched party processing failed - delivery_tag: {}, error: {}",
                    delivery_tag, e
                );
                let error = as_allocator_error(&e)
                    .cloned()
                    .unwrap_or_else(|| AllocatorError::InternalError {
                        message: e.to_string(),
                    });
                self.handler.handle_error(error, &content).await;
            }
        }

        if let Err(e) = channel
            .basic_ack(BasicAckArguments::new(delivery_tag, false))
            .await
        {
            warn!("Failed to ack delivery {}: {}", delivery_tag, e);
        }
    }
}

/// Mock handler for testing
#[derive(Default)]
pub struct MockMatchedPartyHandler {
    pub received_requests: Arc<tokio::sync::Mutex<Vec<MatchedPartyRequest>>>,
    pub errors: Arc<tokio::sync::Mutex<Vec<AllocatorError>>>,
}

impl MockMatchedPartyHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MatchedPartyHandler for MockMatchedPartyHandler {
    async fn handle_matched_party(&self, request: MatchedPartyRequest) -> Result<MatchId> {
        let match_id = request
            .match_id
            .clone()
            .unwrap_or_else(|| "generated".to_string());
        self.received_requests.lock().await.push(request);
        Ok(match_id)
    }

    async fn handle_error(&self, error: AllocatorError, _message_data: &[u8]) {
        self.errors.lock().await.push(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_process_forwards_request() {
        let handler = MockMatchedPartyHandler::new();

        let match_id = process_matched_party(&handler, br#"{"match_id":"m1"}"#)
            .await
            .unwrap();
        assert_eq!(match_id, "m1");

        let received = handler.received_requests.lock().await;
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].match_id.as_deref(), Some("m1"));
    }

    #[tokio::test]
    async fn test_process_rejects_garbage_before_handler() {
        let handler = MockMatchedPartyHandler::new();

        let err = process_matched_party(&handler, b"{broken").await.unwrap_err();
        assert!(matches!(
            as_allocator_error(&err),
            Some(AllocatorError::InvalidPayload { .. })
        ));
        assert!(handler.received_requests.lock().await.is_empty());
    }
}
