//! RPC procedures exposed to clients
//!
//! Procedures take a JSON string and return a JSON string. Failures carry
//! only the short client-facing message.

use crate::error::as_allocator_error;
use crate::query::QueryService;
use crate::types::MatchId;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const GET_SERVER_INFO: &str = "get_server_info";

/// Every procedure the router answers
pub const PROCEDURES: &[&str] = &[GET_SERVER_INFO];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetServerInfoRequest {
    #[serde(default)]
    pub match_id: Option<MatchId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetServerInfoResponse {
    pub host: String,
    pub port: u16,
}

/// Failure returned to the RPC caller
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RpcError {
    #[error("Unknown procedure: {name}")]
    UnknownProcedure { name: String },

    #[error("Invalid payload: {reason}")]
    InvalidPayload { reason: String },

    /// Procedure ran and failed; `message` is what the client sees
    #[error("{message}")]
    Failed { message: String },
}

impl RpcError {
    pub fn message(&self) -> String {
        self.to_string()
    }
}

/// Dispatches procedure calls by name
#[derive(Clone)]
pub struct RpcRouter {
    query: QueryService,
}

impl RpcRouter {
    pub fn new(query: QueryService) -> Self {
        Self { query }
    }

    pub fn procedures(&self) -> &'static [&'static str] {
        PROCEDURES
    }

    pub fn call(&self, name: &str, payload: &str) -> Result<String, RpcError> {
        debug!("RPC {} called with {} bytes", name, payload.len());

        match name {
            GET_SERVER_INFO => {
                let request: GetServerInfoRequest = parse_payload(payload)?;
                let response = self.get_server_info(&request)?;
                serde_json::to_string(&response).map_err(|e| RpcError::Failed {
                    message: format!("Failed to encode response: {}", e),
                })
            }
            _ => {
                warn!("Call to unregistered RPC {}", name);
                Err(RpcError::UnknownProcedure {
                    name: name.to_string(),
                })
            }
        }
    }

    /// Connection info for `request.match_id`; a missing id reads as an unknown match
    pub fn get_server_info(
        &self,
        request: &GetServerInfoRequest,
    ) -> Result<GetServerInfoResponse, RpcError> {
        let Some(match_id) = request.match_id.as_deref() else {
            return Err(RpcError::Failed {
                message: "Match not found".to_string(),
            });
        };

        self.query
            .get_connection_info(match_id)
            .map(|info| GetServerInfoResponse {
                host: info.host,
                port: info.port,
            })
            .map_err(|e| RpcError::Failed {
                message: as_allocator_error(&e)
                    .map(|err| err.rpc_message().to_string())
                    .unwrap_or_else(|| e.to_string()),
            })
    }
}

fn parse_payload<T: serde::de::DeserializeOwned + Default>(payload: &str) -> Result<T, RpcError> {
    if payload.trim().is_empty() {
        return Ok(T::default());
    }
    serde_json::from_str(payload).map_err(|e| RpcError::InvalidPayload {
        reason: e.to_string(),
    })
}
