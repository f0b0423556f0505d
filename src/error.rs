//! Error types for the allocation service
//!
//! This module defines all error types using anyhow for consistent error handling
//! throughout the application.

use crate::types::{MatchId, ServerId};

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific allocation scenarios
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllocatorError {
    #[error("No available server")]
    NoAvailableServer,

    #[error("Match not found: {match_id}")]
    MatchNotFound { match_id: MatchId },

    #[error("Server not found: {server_id}")]
    ServerNotFound { server_id: ServerId },

    #[error("Match already exists: {match_id}")]
    DuplicateMatch { match_id: MatchId },

    #[error("Invalid payload: {reason}")]
    InvalidPayload { reason: String },

    #[error("AMQP connection failed: {message}")]
    AmqpConnectionFailed { message: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}

impl AllocatorError {
    /// Client-facing message, without identifiers
    pub fn rpc_message(&self) -> &'static str {
        match self {
            AllocatorError::NoAvailableServer => "No available server",
            AllocatorError::MatchNotFound { .. } => "Match not found",
            AllocatorError::ServerNotFound { .. } => "Server not found",
            AllocatorError::DuplicateMatch { .. } => "Match already exists",
            AllocatorError::InvalidPayload { .. } => "Invalid payload",
            AllocatorError::AmqpConnectionFailed { .. }
            | AllocatorError::ConfigurationError { .. }
            | AllocatorError::InternalError { .. } => "Internal error",
        }
    }

    /// Shorthand for the poisoned-lock case
    pub(crate) fn lock_poisoned(what: &str) -> Self {
        AllocatorError::InternalError {
            message: format!("Failed to acquire {} lock", what),
        }
    }
}

/// Find the allocator error behind an anyhow error, if there is one
pub fn as_allocator_error(error: &anyhow::Error) -> Option<&AllocatorError> {
    error.downcast_ref::<AllocatorError>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_messages_hide_identifiers() {
        let err = AllocatorError::MatchNotFound {
            match_id: "abc".to_string(),
        };
        assert_eq!(err.to_string(), "Match not found: abc");
        assert_eq!(err.rpc_message(), "Match not found");

        let err = AllocatorError::ServerNotFound { server_id: 9 };
        assert_eq!(err.rpc_message(), "Server not found");
    }

    #[test]
    fn test_downcast_through_anyhow() {
        let err: anyhow::Error = AllocatorError::NoAvailableServer.into();
        assert_eq!(
            as_allocator_error(&err),
            Some(&AllocatorError::NoAvailableServer)
        );

        let other = anyhow::anyhow!("something else");
        assert!(as_allocator_error(&other).is_none());
    }
}
