//! Test fixtures and mock implementations for integration testing

#![allow(dead_code)]

use async_trait::async_trait;
use match_allocator::amqp::publisher::EventPublisher;
use match_allocator::error::Result;
use match_allocator::host::HostAdapter;
use match_allocator::lifecycle::{spawn_event_forwarder, EventDispatcher, MatchManager};
use match_allocator::pool::{ServerPool, SlotSpec};
use match_allocator::query::{QueryService, StaticHostResolver};
use match_allocator::registry::MatchRegistry;
use match_allocator::types::{MatchCreated, MatchEvent, MatchTerminated, PlayerJoined};
use match_allocator::utils::ManualClock;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

pub const TEST_HOST: &str = "203.0.113.10";

/// Publisher that keeps every event it is handed
#[derive(Debug, Default)]
pub struct CapturingEventPublisher {
    published_events: Mutex<Vec<MatchEvent>>,
}

impl CapturingEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_published_events(&self) -> Vec<MatchEvent> {
        self.published_events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Count events of a specific kind
    pub fn count_events_of_type(&self, kind: &str) -> usize {
        self.get_published_events()
            .iter()
            .filter(|event| event.kind() == kind)
            .count()
    }

    fn push(&self, event: MatchEvent) {
        if let Ok(mut events) = self.published_events.lock() {
            events.push(event);
        }
    }
}

#[async_trait]
impl EventPublisher for CapturingEventPublisher {
    async fn publish_match_created(&self, event: MatchCreated) -> Result<()> {
        self.push(MatchEvent::MatchCreated(event));
        Ok(())
    }

    async fn publish_player_joined(&self, event: PlayerJoined) -> Result<()> {
        self.push(MatchEvent::PlayerJoined(event));
        Ok(())
    }

    async fn publish_match_terminated(&self, event: MatchTerminated) -> Result<()> {
        self.push(MatchEvent::MatchTerminated(event));
        Ok(())
    }
}

/// Slots 1..=n on ports 7777..
pub fn slot_specs(count: u32) -> Vec<SlotSpec> {
    (1..=count)
        .map(|id| SlotSpec {
            id,
            port: 7776 + id as u16,
        })
        .collect()
}

/// A complete allocator wired the way the service wires it, minus transports
pub struct TestSystem {
    pub manager: Arc<MatchManager>,
    pub clock: Arc<ManualClock>,
    pub query: QueryService,
    pub adapter: HostAdapter,
    pub publisher: Arc<CapturingEventPublisher>,
    shutdown_tx: broadcast::Sender<()>,
    forwarder: JoinHandle<()>,
}

impl TestSystem {
    pub fn new(slots: u32) -> Self {
        let clock = Arc::new(ManualClock::default());
        let (events, receiver) = EventDispatcher::channel();
        let publisher = Arc::new(CapturingEventPublisher::new());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let forwarder = spawn_event_forwarder(receiver, publisher.clone(), shutdown_rx);

        let pool = ServerPool::new(&slot_specs(slots)).expect("valid pool");
        let manager = Arc::new(
            MatchManager::new(pool, MatchRegistry::new())
                .with_clock(clock.clone())
                .with_events(events),
        );
        let query = QueryService::new(
            manager.shared_state(),
            Arc::new(StaticHostResolver(TEST_HOST.to_string())),
        );
        let adapter = HostAdapter::new(manager.clone(), query.clone());

        Self {
            manager,
            clock,
            query,
            adapter,
            publisher,
            shutdown_tx,
            forwarder,
        }
    }

    /// Stop the forwarder after it has published everything queued so far
    pub async fn flush_events(self) -> Arc<CapturingEventPublisher> {
        let _ = self.shutdown_tx.send(());
        let _ = self.forwarder.await;
        self.publisher
    }
}
