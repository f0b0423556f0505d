//! AMQP integration for the allocation service
//!
//! Optional transport: matched parties arrive on a queue and lifecycle
//! events leave through a topic exchange. The service runs without it.

pub mod connection;
pub mod handlers;
pub mod messages;
pub mod publisher;

// Re-export commonly used types
pub use connection::{AmqpConfig, AmqpConnection};
pub use handlers::{MatchedPartyConsumer, MatchedPartyHandler};
pub use messages::*;
pub use publisher::{AmqpEventPublisher, EventPublisher, TracingEventPublisher};
