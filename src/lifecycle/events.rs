//! Non-blocking hand-off of lifecycle events
//!
//! The manager never awaits a publisher while deciding allocations. Events go
//! into an unbounded channel and a background task forwards them.

use crate::amqp::messages::MessageUtils;
use crate::amqp::publisher::EventPublisher;
use crate::types::MatchEvent;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Sending half handed to the match manager
#[derive(Debug, Clone, Default)]
pub struct EventDispatcher {
    sender: Option<mpsc::UnboundedSender<MatchEvent>>,
}

impl EventDispatcher {
    /// Dispatcher that drops every event
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    /// Dispatcher plus the receiver that will see its events
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<MatchEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender: Some(sender),
            },
            receiver,
        )
    }

    /// Queue an event; never blocks
    pub fn emit(&self, event: MatchEvent) {
        if let Some(sender) = &self.sender {
            if let Err(e) = sender.send(event) {
                debug!("Dropping {} event, forwarder is gone", e.0.kind());
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.sender.is_some()
    }
}

async fn forward(publisher: &dyn EventPublisher, event: MatchEvent) {
    let kind = event.kind();
    let match_id = event.match_id().to_string();
    debug!(
        "Forwarding {} for match {} ({})",
        kind,
        match_id,
        MessageUtils::get_routing_key(&event)
    );
    if let Err(e) = publisher.publish(event).await {
        warn!(
            "Failed to publish {} event for match {}: {}",
            kind, match_id, e
        );
    }
}

/// Drain `receiver` into `publisher`
///
/// Stops when every dispatcher is dropped, or on `shutdown` after flushing
/// whatever is already queued.
pub fn spawn_event_forwarder(
    mut receiver: mpsc::UnboundedReceiver<MatchEvent>,
    publisher: Arc<dyn EventPublisher>,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Match event forwarder started");

        loop {
            tokio::select! {
                event = receiver.recv() => match event {
                    Some(event) => forward(publisher.as_ref(), event).await,
                    None => break,
                },
                _ = shutdown.recv() => {
                    while let Ok(event) = receiver.try_recv() {
                        forward(publisher.as_ref(), event).await;
                    }
                    break;
                }
            }
        }

        info!("Match event forwarder stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amqp::publisher::MockEventPublisher;
    use crate::types::{MatchCreated, MatchEvent};
    use crate::utils::current_timestamp;

    fn created(match_id: &str) -> MatchEvent {
        MatchEvent::MatchCreated(MatchCreated {
            match_id: match_id.to_string(),
            server_id: 1,
            port: 7777,
            timestamp: current_timestamp(),
        })
    }

    #[test]
    fn test_disabled_dispatcher_drops_events() {
        let dispatcher = EventDispatcher::disabled();
        assert!(!dispatcher.is_enabled());
        dispatcher.emit(created("m1"));
    }

    #[test]
    fn test_emit_survives_closed_receiver() {
        let (dispatcher, receiver) = EventDispatcher::channel();
        drop(receiver);
        dispatcher.emit(created("m1"));
    }

    #[tokio::test]
    async fn test_forwarder_publishes_in_order() {
        let (dispatcher, receiver) = EventDispatcher::channel();
        let publisher = Arc::new(MockEventPublisher::new());
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = spawn_event_forwarder(receiver, publisher.clone(), shutdown_rx);

        dispatcher.emit(created("m1"));
        dispatcher.emit(created("m2"));
        drop(dispatcher);

        handle.await.unwrap();
        assert_eq!(
            publisher.get_published_events(),
            vec!["MatchCreated:m1".to_string(), "MatchCreated:m2".to_string()]
        );
    }

    #[tokio::test]
    async fn test_forwarder_flushes_on_shutdown() {
        let (dispatcher, receiver) = EventDispatcher::channel();
        let publisher = Arc::new(MockEventPublisher::new());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        dispatcher.emit(created("m1"));
        shutdown_tx.send(()).unwrap();
        let handle = spawn_event_forwarder(receiver, publisher.clone(), shutdown_rx);

        handle.await.unwrap();
        assert_eq!(publisher.get_published_events(), vec!["MatchCreated:m1"]);
        assert!(dispatcher.is_enabled());
    }
}
