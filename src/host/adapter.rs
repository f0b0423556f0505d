//! Host hooks over the match lifecycle
//!
//! A game host calls these hooks with loosely typed payloads. The adapter
//! parses them at the boundary and forwards typed calls to `MatchLifecycle`.

use crate::amqp::messages::MessageUtils;
use crate::error::{AllocatorError, Result};
use crate::host::rpc::{RpcError, RpcRouter};
use crate::lifecycle::MatchLifecycle;
use crate::query::QueryService;
use crate::types::{JoinOutcome, MatchId, MatchRecord, Presence};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

/// What the host gets back from a join attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinAttemptResponse {
    /// Match state after the join, or `{}` on rejection
    pub state: Value,
    pub accept: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reject_message: Option<String>,
}

impl JoinAttemptResponse {
    fn from_outcome(outcome: JoinOutcome) -> Result<Self> {
        Ok(match outcome {
            JoinOutcome::Accepted(record) => Self {
                state: serde_json::to_value(record)?,
                accept: true,
                reject_message: None,
            },
            JoinOutcome::Rejected(reason) => Self {
                state: json!({}),
                accept: false,
                reject_message: Some(reason.message().to_string()),
            },
        })
    }
}

/// The four lifecycle hooks plus the RPC surface
#[derive(Clone)]
pub struct HostAdapter {
    lifecycle: Arc<dyn MatchLifecycle>,
    rpc: RpcRouter,
}

impl HostAdapter {
    pub fn new(lifecycle: Arc<dyn MatchLifecycle>, query: QueryService) -> Self {
        let rpc = RpcRouter::new(query);
        info!(
            "Match handler module loaded (rpcs: {})",
            rpc.procedures().join(", ")
        );
        Self { lifecycle, rpc }
    }

    pub fn lifecycle(&self) -> Arc<dyn MatchLifecycle> {
        self.lifecycle.clone()
    }

    /// Matched-party hook: JSON payload in, match id out
    pub fn matchmaker_matched(&self, payload: &str) -> Result<MatchId> {
        let request = MessageUtils::deserialize_matched_party(payload.as_bytes())?;
        self.lifecycle.create_match(request.match_id)
    }

    pub fn match_join_attempt(
        &self,
        match_id: &str,
        presence: &Presence,
    ) -> Result<JoinAttemptResponse> {
        let outcome = self.lifecycle.attempt_join(match_id, presence)?;
        JoinAttemptResponse::from_outcome(outcome)
    }

    /// Loop hook: `None` tells the host to stop the match
    pub fn match_loop(&self, state: Value) -> Result<Option<Value>> {
        let record: MatchRecord =
            serde_json::from_value(state).map_err(|e| AllocatorError::InvalidPayload {
                reason: format!("Unrecognized match state: {}", e),
            })?;

        match self.lifecycle.tick(record)? {
            Some(record) => Ok(Some(serde_json::to_value(record)?)),
            None => Ok(None),
        }
    }

    pub fn match_terminate(&self, match_id: &str) -> Result<()> {
        self.lifecycle.terminate(match_id)
    }

    pub fn rpc(&self, name: &str, payload: &str) -> std::result::Result<String, RpcError> {
        self.rpc.call(name, payload)
    }
}
