//! Common types used throughout the allocation service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a match (session)
pub type MatchId = String;

/// Identifier of a user joining a match
pub type UserId = String;

/// Identifier of a pool slot
pub type ServerId = u32;

/// Maximum number of players in a match
pub const MAX_PLAYERS_PER_MATCH: usize = 2;

/// One allocatable backend server process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSlot {
    pub id: ServerId,
    pub port: u16,
    pub busy: bool,
    pub match_id: Option<MatchId>,
}

impl ServerSlot {
    /// Create a free slot
    pub fn new(id: ServerId, port: u16) -> Self {
        Self {
            id,
            port,
            busy: false,
            match_id: None,
        }
    }
}

/// Live session state binding a match to a slot and its players
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatchRecord {
    pub match_id: MatchId,
    pub server_id: ServerId,
    /// Join order is preserved
    pub players: Vec<UserId>,
    pub start_time: DateTime<Utc>,
}

impl MatchRecord {
    pub fn is_full(&self) -> bool {
        self.players.len() >= MAX_PLAYERS_PER_MATCH
    }
}

/// A user presence attempting to join a match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presence {
    pub user_id: UserId,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

impl Presence {
    pub fn new(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: None,
            username: None,
        }
    }
}

/// Reason a join attempt was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinRejection {
    MatchNotFound,
    MatchFull,
}

impl JoinRejection {
    pub fn message(&self) -> &'static str {
        match self {
            JoinRejection::MatchNotFound => "Match not found",
            JoinRejection::MatchFull => "Match is full",
        }
    }
}

impl std::fmt::Display for JoinRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// Result of a join attempt; rejections are data, not errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Player appended; carries the record after the join
    Accepted(MatchRecord),
    Rejected(JoinRejection),
}

impl JoinOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, JoinOutcome::Accepted(_))
    }

    pub fn reject_reason(&self) -> Option<&'static str> {
        match self {
            JoinOutcome::Accepted(_) => None,
            JoinOutcome::Rejected(reason) => Some(reason.message()),
        }
    }

    pub fn state(&self) -> Option<&MatchRecord> {
        match self {
            JoinOutcome::Accepted(record) => Some(record),
            JoinOutcome::Rejected(_) => None,
        }
    }
}

/// Where a client should connect for a match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub host: String,
    pub port: u16,
}

/// Why a match was torn down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TerminationReason {
    /// Exceeded the maximum match duration at a tick
    Expired,
    /// Terminated explicitly by the host
    Requested,
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminationReason::Expired => write!(f, "expired"),
            TerminationReason::Requested => write!(f, "requested"),
        }
    }
}

/// Request from the matchmaker once a party has been matched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchedPartyRequest {
    /// Optional caller-chosen id; generated when absent
    #[serde(default, alias = "matchId")]
    pub match_id: Option<MatchId>,
}

/// Event emitted when a match has been allocated a server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchCreated {
    pub match_id: MatchId,
    pub server_id: ServerId,
    pub port: u16,
    pub timestamp: DateTime<Utc>,
}

/// Event emitted when a player joined a match
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerJoined {
    pub match_id: MatchId,
    pub user_id: UserId,
    pub players: Vec<UserId>,
    pub timestamp: DateTime<Utc>,
}

/// Event emitted when a match released its server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchTerminated {
    pub match_id: MatchId,
    pub server_id: ServerId,
    pub reason: TerminationReason,
    pub timestamp: DateTime<Utc>,
}

/// Union type for all lifecycle events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MatchEvent {
    MatchCreated(MatchCreated),
    PlayerJoined(PlayerJoined),
    MatchTerminated(MatchTerminated),
}

impl MatchEvent {
    pub fn match_id(&self) -> &str {
        match self {
            MatchEvent::MatchCreated(e) => &e.match_id,
            MatchEvent::PlayerJoined(e) => &e.match_id,
            MatchEvent::MatchTerminated(e) => &e.match_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            MatchEvent::MatchCreated(_) => "MatchCreated",
            MatchEvent::PlayerJoined(_) => "PlayerJoined",
            MatchEvent::MatchTerminated(_) => "MatchTerminated",
        }
    }
}
