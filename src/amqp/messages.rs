//! AMQP message definitions and serialization

use crate::error::{AllocatorError, Result};
use crate::types::*;
use serde_json;

/// Queue the matchmaker publishes matched parties to
pub const MATCHED_PARTY_QUEUE: &str = "allocator.matched_parties";
/// Topic exchange for lifecycle events
pub const MATCH_EVENTS_EXCHANGE: &str = "allocator.match_events";

/// Routing keys for events
pub const MATCH_CREATED_ROUTING_KEY: &str = "match.created";
pub const PLAYER_JOINED_ROUTING_KEY: &str = "match.player_joined";
pub const MATCH_TERMINATED_ROUTING_KEY: &str = "match.terminated";

/// Message envelope with metadata
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MessageEnvelope<T> {
    pub payload: T,
    pub correlation_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub routing_key: String,
}

impl<T> MessageEnvelope<T>
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    pub fn new(payload: T, routing_key: String) -> Self {
        Self {
            payload,
            correlation_id: uuid::Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now(),
            routing_key,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| {
            AllocatorError::InternalError {
                message: format!("Failed to serialize message: {}", e),
            }
            .into()
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| {
            AllocatorError::InvalidPayload {
                reason: format!("Failed to deserialize message: {}", e),
            }
            .into()
        })
    }
}

/// Message serialization and validation utilities
pub struct MessageUtils;

impl MessageUtils {
    /// Parse a matched-party request; an empty body means "generate an id"
    pub fn deserialize_matched_party(bytes: &[u8]) -> Result<MatchedPartyRequest> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(MatchedPartyRequest::default());
        }

        let request: MatchedPartyRequest =
            serde_json::from_slice(bytes).map_err(|e| AllocatorError::InvalidPayload {
                reason: format!("Failed to deserialize matched party request: {}", e),
            })?;

        Self::validate_matched_party(&request)?;
        Ok(request)
    }

    pub fn validate_matched_party(request: &MatchedPartyRequest) -> Result<()> {
        if let Some(match_id) = &request.match_id {
            if match_id.trim().is_empty() {
                return Err(AllocatorError::InvalidPayload {
                    reason: "Match ID cannot be blank".to_string(),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Serialize any AMQP message to bytes
    pub fn serialize_message<T: serde::Serialize>(message: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(message).map_err(|e| {
            AllocatorError::InternalError {
                message: format!("Failed to serialize message: {}", e),
            }
            .into()
        })
    }

    pub fn get_routing_key(event: &MatchEvent) -> &'static str {
        match event {
            MatchEvent::MatchCreated(_) => MATCH_CREATED_ROUTING_KEY,
            MatchEvent::PlayerJoined(_) => PLAYER_JOINED_ROUTING_KEY,
            MatchEvent::MatchTerminated(_) => MATCH_TERMINATED_ROUTING_KEY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::as_allocator_error;

    #[test]
    fn test_message_envelope_creation() {
        let request = MatchedPartyRequest {
            match_id: Some("m1".to_string()),
        };
        let envelope = MessageEnvelope::new(request, "test.routing.key".to_string());

        assert_eq!(envelope.routing_key, "test.routing.key");
        assert!(!envelope.correlation_id.is_empty());
    }

    #[test]
    fn test_matched_party_parsing() {
        let request = MessageUtils::deserialize_matched_party(br#"{"match_id":"m1"}"#).unwrap();
        assert_eq!(request.match_id.as_deref(), Some("m1"));

        let request = MessageUtils::deserialize_matched_party(br#"{"matchId":"m2"}"#).unwrap();
        assert_eq!(request.match_id.as_deref(), Some("m2"));

        let request = MessageUtils::deserialize_matched_party(b"{}").unwrap();
        assert!(request.match_id.is_none());

        let request = MessageUtils::deserialize_matched_party(b"  ").unwrap();
        assert!(request.match_id.is_none());
    }

    #[test]
    fn test_matched_party_rejects_bad_input() {
        let err = MessageUtils::deserialize_matched_party(b"not json").unwrap_err();
        assert!(matches!(
            as_allocator_error(&err),
            Some(AllocatorError::InvalidPayload { .. })
        ));

        assert!(MessageUtils::deserialize_matched_party(br#"{"match_id":"  "}"#).is_err());
    }

    #[test]
    fn test_routing_key_generation() {
        let event = MatchEvent::MatchTerminated(MatchTerminated {
            match_id: "m1".to_string(),
            server_id: 1,
            reason: TerminationReason::Expired,
            timestamp: chrono::Utc::now(),
        });
        assert_eq!(
            MessageUtils::get_routing_key(&event),
            MATCH_TERMINATED_ROUTING_KEY
        );
    }
}
