//! In-memory registry of live matches

use crate::error::{AllocatorError, Result};
use crate::types::{MatchId, MatchRecord, ServerId, UserId, MAX_PLAYERS_PER_MATCH};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Match id → match record
#[derive(Debug, Default)]
pub struct MatchRegistry {
    matches: HashMap<MatchId, MatchRecord>,
}

impl MatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fresh record with no players
    pub fn create(
        &mut self,
        match_id: &str,
        server_id: ServerId,
        start_time: DateTime<Utc>,
    ) -> Result<MatchRecord> {
        if self.matches.contains_key(match_id) {
            return Err(AllocatorError::DuplicateMatch {
                match_id: match_id.to_string(),
            }
            .into());
        }

        let record = MatchRecord {
            match_id: match_id.to_string(),
            server_id,
            players: Vec::new(),
            start_time,
        };
        self.matches.insert(match_id.to_string(), record.clone());
        Ok(record)
    }

    pub fn get(&self, match_id: &str) -> Option<&MatchRecord> {
        self.matches.get(match_id)
    }

    pub fn contains(&self, match_id: &str) -> bool {
        self.matches.contains_key(match_id)
    }

    /// Append a player and return the updated record
    ///
    /// Callers decide whether the match is full first; the cap is still
    /// enforced here so the stored record can never exceed it.
    pub fn add_player(&mut self, match_id: &str, user_id: UserId) -> Result<MatchRecord> {
        let record =
            self.matches
                .get_mut(match_id)
                .ok_or_else(|| AllocatorError::MatchNotFound {
                    match_id: match_id.to_string(),
                })?;

        if record.players.len() < MAX_PLAYERS_PER_MATCH {
            record.players.push(user_id);
        }
        Ok(record.clone())
    }

    /// Delete a record, returning it if it existed
    pub fn remove(&mut self, match_id: &str) -> Option<MatchRecord> {
        self.matches.remove(match_id)
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &MatchRecord> {
        self.matches.values()
    }

    pub fn match_ids(&self) -> Vec<MatchId> {
        self.matches.keys().cloned().collect()
    }

    /// Total number of joined players across matches
    pub fn player_count(&self) -> usize {
        self.matches.values().map(|m| m.players.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::as_allocator_error;
    use crate::utils::current_timestamp;

    #[test]
    fn test_create_and_get() {
        let mut registry = MatchRegistry::new();
        let now = current_timestamp();
        let record = registry.create("m1", 1, now).unwrap();

        assert_eq!(record.server_id, 1);
        assert!(record.players.is_empty());
        assert_eq!(record.start_time, now);
        assert_eq!(registry.get("m1"), Some(&record));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_create_fails() {
        let mut registry = MatchRegistry::new();
        registry.create("m1", 1, current_timestamp()).unwrap();

        let err = registry.create("m1", 2, current_timestamp()).unwrap_err();
        assert_eq!(
            as_allocator_error(&err),
            Some(&AllocatorError::DuplicateMatch {
                match_id: "m1".to_string()
            })
        );
        assert_eq!(registry.get("m1").unwrap().server_id, 1);
    }

    #[test]
    fn test_add_player_preserves_order_and_cap() {
        let mut registry = MatchRegistry::new();
        registry.create("m1", 1, current_timestamp()).unwrap();

        registry.add_player("m1", "a".to_string()).unwrap();
        let record = registry.add_player("m1", "b".to_string()).unwrap();
        assert_eq!(record.players, vec!["a".to_string(), "b".to_string()]);

        let record = registry.add_player("m1", "c".to_string()).unwrap();
        assert_eq!(record.players.len(), MAX_PLAYERS_PER_MATCH);
        assert_eq!(registry.player_count(), 2);
    }

    #[test]
    fn test_add_player_unknown_match() {
        let mut registry = MatchRegistry::new();
        let err = registry.add_player("ghost", "a".to_string()).unwrap_err();
        assert!(matches!(
            as_allocator_error(&err),
            Some(AllocatorError::MatchNotFound { .. })
        ));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut registry = MatchRegistry::new();
        registry.create("m1", 1, current_timestamp()).unwrap();

        assert!(registry.remove("m1").is_some());
        assert!(registry.remove("m1").is_none());
        assert!(registry.is_empty());
    }
}
