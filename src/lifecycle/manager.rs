//! Match manager: allocation and lifecycle of matches
//!
//! This module provides the `MatchManager`, which coordinates the server pool
//! and the match registry. Pool and registry sit behind a single lock so a
//! slot and its record always change together.

use crate::error::{AllocatorError, Result};
use crate::lifecycle::events::EventDispatcher;
use crate::metrics::{MetricsCollector, MetricsTimer};
use crate::pool::ServerPool;
use crate::registry::MatchRegistry;
use crate::types::{
    JoinOutcome, JoinRejection, MatchCreated, MatchEvent, MatchId, MatchRecord, MatchTerminated,
    PlayerJoined, Presence, ServerSlot, TerminationReason,
};
use crate::utils::{elapsed_millis, Clock, MatchIdGenerator, SystemClock, UuidMatchIdGenerator};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Default cap on how long a match may hold its server
pub const DEFAULT_MAX_MATCH_DURATION: Duration = Duration::from_secs(30 * 60);

/// The four operations a host drives a match through
pub trait MatchLifecycle: Send + Sync {
    /// Reserve a server and register a match; returns the match id
    fn create_match(&self, requested_id: Option<MatchId>) -> Result<MatchId>;

    /// Try to add a player; rejections are returned, not raised
    fn attempt_join(&self, match_id: &str, presence: &Presence) -> Result<JoinOutcome>;

    /// Periodic check; `None` means the match was torn down. A state that
    /// no longer matches the registered record is returned untouched.
    fn tick(&self, state: MatchRecord) -> Result<Option<MatchRecord>>;

    /// Release the match's server and forget it; safe to repeat
    fn terminate(&self, match_id: &str) -> Result<()>;
}

/// Pool and registry, guarded together
#[derive(Debug)]
pub struct AllocatorState {
    pub pool: ServerPool,
    pub registry: MatchRegistry,
}

impl AllocatorState {
    pub fn new(pool: ServerPool, registry: MatchRegistry) -> Self {
        Self { pool, registry }
    }

    /// Check that busy slots and live records pair up one-to-one
    pub fn check_consistency(&self) -> std::result::Result<(), String> {
        for record in self.registry.records() {
            match self.pool.lookup(record.server_id) {
                Some(slot) if slot.busy && slot.match_id.as_ref() == Some(&record.match_id) => {}
                Some(slot) => {
                    return Err(format!(
                        "match {} points at server {} which is assigned to {:?}",
                        record.match_id, slot.id, slot.match_id
                    ))
                }
                None => {
                    return Err(format!(
                        "match {} points at unknown server {}",
                        record.match_id, record.server_id
                    ))
                }
            }
        }

        for slot in self.pool.slots().iter().filter(|s| s.busy) {
            let owner = slot
                .match_id
                .as_deref()
                .and_then(|id| self.registry.get(id));
            if owner.map(|r| r.server_id) != Some(slot.id) {
                return Err(format!(
                    "server {} is busy without a live match ({:?})",
                    slot.id, slot.match_id
                ));
            }
        }

        Ok(())
    }
}

/// Statistics about match manager operations
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct MatchManagerStats {
    /// Total matches created
    pub matches_created: u64,
    /// Total matches terminated, any reason
    pub matches_terminated: u64,
    /// Matches terminated because they ran too long
    pub matches_expired: u64,
    /// Create requests refused for lack of a server
    pub allocation_failures: u64,
    /// Join attempts accepted
    pub joins_accepted: u64,
    /// Join attempts rejected
    pub joins_rejected: u64,
    /// Current number of registered matches
    pub active_matches: usize,
    /// Players across all registered matches
    pub joined_players: usize,
    /// Current number of busy slots
    pub busy_slots: usize,
    /// Number of slots in the pool
    pub pool_size: usize,
}

/// The main match manager
#[derive(Clone)]
pub struct MatchManager {
    /// Pool and registry
    state: Arc<RwLock<AllocatorState>>,
    /// Time source for start times and expiry
    clock: Arc<dyn Clock>,
    /// Identifier source for matches created without an id
    id_generator: Arc<dyn MatchIdGenerator>,
    /// Matches older than this are terminated at their next tick
    max_match_duration: Duration,
    /// Fire-and-forget lifecycle events
    events: EventDispatcher,
    /// Manager statistics
    stats: Arc<RwLock<MatchManagerStats>>,
    /// Metrics collector for recording performance data
    metrics_collector: Arc<MetricsCollector>,
}

impl MatchManager {
    /// Create a manager over the given stores with default collaborators
    pub fn new(pool: ServerPool, registry: MatchRegistry) -> Self {
        // Create a default metrics collector if none provided
        let metrics_collector = Arc::new(MetricsCollector::new().unwrap_or_else(|_| {
            warn!("Failed to create metrics collector, using default");
            MetricsCollector::default()
        }));

        let manager = Self {
            state: Arc::new(RwLock::new(AllocatorState::new(pool, registry))),
            clock: Arc::new(SystemClock),
            id_generator: Arc::new(UuidMatchIdGenerator),
            max_match_duration: DEFAULT_MAX_MATCH_DURATION,
            events: EventDispatcher::disabled(),
            stats: Arc::new(RwLock::new(MatchManagerStats::default())),
            metrics_collector,
        };
        manager.refresh_occupancy_metrics();
        manager
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_id_generator(mut self, id_generator: Arc<dyn MatchIdGenerator>) -> Self {
        self.id_generator = id_generator;
        self
    }

    pub fn with_max_match_duration(mut self, max_match_duration: Duration) -> Self {
        self.max_match_duration = max_match_duration;
        self
    }

    pub fn with_events(mut self, events: EventDispatcher) -> Self {
        self.events = events;
        self
    }

    pub fn with_metrics(mut self, metrics_collector: Arc<MetricsCollector>) -> Self {
        self.metrics_collector = metrics_collector;
        self.refresh_occupancy_metrics();
        self
    }

    /// Shared handle to the stores, for read-only consumers
    pub fn shared_state(&self) -> Arc<RwLock<AllocatorState>> {
        self.state.clone()
    }

    pub fn max_match_duration(&self) -> Duration {
        self.max_match_duration
    }

    fn read_state(&self) -> Result<RwLockReadGuard<'_, AllocatorState>> {
        self.state
            .read()
            .map_err(|_| AllocatorError::lock_poisoned("allocator state").into())
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, AllocatorState>> {
        self.state
            .write()
            .map_err(|_| AllocatorError::lock_poisoned("allocator state").into())
    }

    fn update_stats(&self, update: impl FnOnce(&mut MatchManagerStats)) {
        match self.stats.write() {
            Ok(mut stats) => update(&mut stats),
            Err(_) => warn!("Failed to acquire stats lock"),
        }
    }

    fn record_occupancy(&self, state: &AllocatorState) {
        self.metrics_collector.update_occupancy(
            state.pool.busy_count(),
            state.pool.size(),
            state.registry.len(),
        );
    }

    fn refresh_occupancy_metrics(&self) {
        if let Ok(state) = self.state.read() {
            self.record_occupancy(&state);
        }
    }

    fn max_match_duration_millis(&self) -> i64 {
        i64::try_from(self.max_match_duration.as_millis()).unwrap_or(i64::MAX)
    }

    /// Terminate and report which record was removed
    pub fn terminate_with_reason(
        &self,
        match_id: &str,
        reason: TerminationReason,
    ) -> Result<Option<MatchRecord>> {
        let timer = self.metrics_collector.start_timer();

        let removed = {
            let mut state = self.write_state()?;
            let Some(record) = self.remove_locked(&mut state, match_id) else {
                debug!("Terminate for unknown match {} ignored", match_id);
                return Ok(None);
            };
            record
        };

        self.finish_termination(&removed, reason, timer);
        Ok(Some(removed))
    }

    /// Drop the record and free its server; caller holds the write lock
    fn remove_locked(&self, state: &mut AllocatorState, match_id: &str) -> Option<MatchRecord> {
        let record = state.registry.remove(match_id)?;

        match state.pool.lookup(record.server_id) {
            Some(slot) if slot.match_id.as_deref() == Some(match_id) => {}
            Some(slot) => error!(
                "Server {} was assigned to {:?} while match {} owned it",
                slot.id, slot.match_id, match_id
            ),
            None => error!(
                "Match {} referenced unknown server {}",
                match_id, record.server_id
            ),
        }
        state.pool.release(record.server_id);

        self.record_occupancy(state);
        Some(record)
    }

    fn finish_termination(
        &self,
        removed: &MatchRecord,
        reason: TerminationReason,
        timer: MetricsTimer,
    ) {
        let now = self.clock.now();
        let held_for = elapsed_millis(removed.start_time, now).max(0) as u64;

        info!(
            "Match {} terminated on server {} ({}, players: {})",
            removed.match_id,
            removed.server_id,
            reason,
            removed.players.len()
        );

        self.update_stats(|stats| {
            stats.matches_terminated += 1;
            if reason == TerminationReason::Expired {
                stats.matches_expired += 1;
            }
        });
        self.metrics_collector
            .record_match_terminated(reason, Duration::from_millis(held_for));
        self.metrics_collector
            .record_lifecycle_operation("terminate", timer.stop());

        self.events
            .emit(MatchEvent::MatchTerminated(MatchTerminated {
                match_id: removed.match_id.clone(),
                server_id: removed.server_id,
                reason,
                timestamp: now,
            }));
    }

    /// Tick every registered match once; returns how many were torn down
    pub fn tick_all(&self) -> Result<usize> {
        let match_ids = self.read_state()?.registry.match_ids();
        let mut expired = 0;

        for match_id in match_ids {
            let Some(record) = self.get_match(&match_id)? else {
                continue;
            };
            if self.tick(record)?.is_none() {
                expired += 1;
            }
        }

        if expired > 0 {
            info!("Expired {} matches during tick", expired);
        }
        Ok(expired)
    }

    pub fn get_match(&self, match_id: &str) -> Result<Option<MatchRecord>> {
        Ok(self.read_state()?.registry.get(match_id).cloned())
    }

    /// All registered matches, oldest first
    pub fn list_matches(&self) -> Result<Vec<MatchRecord>> {
        let mut matches: Vec<MatchRecord> =
            self.read_state()?.registry.records().cloned().collect();
        matches.sort_by(|a, b| {
            a.start_time
                .cmp(&b.start_time)
                .then(a.match_id.cmp(&b.match_id))
        });
        Ok(matches)
    }

    /// Copy of every slot in declared order
    pub fn pool_snapshot(&self) -> Result<Vec<ServerSlot>> {
        Ok(self.read_state()?.pool.slots().to_vec())
    }

    /// Verify the slot/record pairing; an `Err` is a consistency bug
    pub fn check_consistency(&self) -> Result<()> {
        self.read_state()?
            .check_consistency()
            .map_err(|message| AllocatorError::InternalError { message }.into())
    }

    /// Get current manager statistics
    pub fn get_stats(&self) -> Result<MatchManagerStats> {
        let mut snapshot = self
            .stats
            .read()
            .map_err(|_| AllocatorError::lock_poisoned("stats"))?
            .clone();

        let state = self.read_state()?;
        snapshot.active_matches = state.registry.len();
        snapshot.joined_players = state.registry.player_count();
        snapshot.busy_slots = state.pool.busy_count();
        snapshot.pool_size = state.pool.size();
        Ok(snapshot)
    }
}

impl MatchLifecycle for MatchManager {
    fn create_match(&self, requested_id: Option<MatchId>) -> Result<MatchId> {
        let timer = self.metrics_collector.start_timer();
        let match_id = requested_id.unwrap_or_else(|| self.id_generator.generate());
        let start_time = self.clock.now();

        let slot = {
            let mut state = self.write_state()?;

            if state.registry.contains(&match_id) {
                return Err(AllocatorError::DuplicateMatch { match_id }.into());
            }

            let Some(slot) = state.pool.find_and_reserve(&match_id) else {
                drop(state);
                warn!(
                    "No available server for match {} - all slots busy",
                    match_id
                );
                self.update_stats(|stats| stats.allocation_failures += 1);
                self.metrics_collector.record_allocation_failure();
                return Err(AllocatorError::NoAvailableServer.into());
            };

            if let Err(e) = state.registry.create(&match_id, slot.id, start_time) {
                state.pool.release(slot.id);
                return Err(e);
            }

            self.record_occupancy(&state);
            slot
        };

        info!(
            "Match {} created on server {} (port: {})",
            match_id, slot.id, slot.port
        );

        self.update_stats(|stats| stats.matches_created += 1);
        self.metrics_collector.record_match_created(slot.id);
        self.metrics_collector
            .record_lifecycle_operation("create", timer.stop());

        self.events.emit(MatchEvent::MatchCreated(MatchCreated {
            match_id: match_id.clone(),
            server_id: slot.id,
            port: slot.port,
            timestamp: start_time,
        }));

        Ok(match_id)
    }

    fn attempt_join(&self, match_id: &str, presence: &Presence) -> Result<JoinOutcome> {
        let timer = self.metrics_collector.start_timer();

        let outcome = {
            let mut state = self.write_state()?;

            match state.registry.get(match_id) {
                None => JoinOutcome::Rejected(JoinRejection::MatchNotFound),
                Some(record) if record.is_full() => JoinOutcome::Rejected(JoinRejection::MatchFull),
                Some(_) => JoinOutcome::Accepted(
                    state
                        .registry
                        .add_player(match_id, presence.user_id.clone())?,
                ),
            }
        };

        self.metrics_collector
            .record_lifecycle_operation("join", timer.stop());

        match &outcome {
            JoinOutcome::Accepted(record) => {
                info!("Player {} joined match {}", presence.user_id, match_id);
                self.update_stats(|stats| stats.joins_accepted += 1);
                self.metrics_collector.record_join("accepted");
                self.events.emit(MatchEvent::PlayerJoined(PlayerJoined {
                    match_id: match_id.to_string(),
                    user_id: presence.user_id.clone(),
                    players: record.players.clone(),
                    timestamp: self.clock.now(),
                }));
            }
            JoinOutcome::Rejected(reason) => {
                warn!(
                    "Player {} rejected from match {}: {}",
                    presence.user_id, match_id, reason
                );
                self.update_stats(|stats| stats.joins_rejected += 1);
                self.metrics_collector.record_join(match reason {
                    JoinRejection::MatchFull => "full",
                    JoinRejection::MatchNotFound => "not_found",
                });
            }
        }

        Ok(outcome)
    }

    fn tick(&self, state: MatchRecord) -> Result<Option<MatchRecord>> {
        let timer = self.metrics_collector.start_timer();
        let now = self.clock.now();

        let removed = {
            let mut guard = self.write_state()?;

            // Only the registered incarnation of this id may be expired
            let elapsed = match guard.registry.get(&state.match_id) {
                Some(current)
                    if current.server_id == state.server_id
                        && current.start_time == state.start_time =>
                {
                    elapsed_millis(current.start_time, now)
                }
                _ => {
                    debug!(
                        "Tick for match {} skipped, state no longer registered",
                        state.match_id
                    );
                    return Ok(Some(state));
                }
            };

            if elapsed <= self.max_match_duration_millis() {
                debug!("Tick for match {} - {}ms elapsed", state.match_id, elapsed);
                return Ok(Some(state));
            }

            info!(
                "Match {} exceeded maximum duration ({}ms elapsed), terminating",
                state.match_id, elapsed
            );
            self.remove_locked(&mut guard, &state.match_id)
        };

        if let Some(removed) = removed {
            self.finish_termination(&removed, TerminationReason::Expired, timer);
        }
        Ok(None)
    }

    fn terminate(&self, match_id: &str) -> Result<()> {
        self.terminate_with_reason(match_id, TerminationReason::Requested)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::as_allocator_error;
    use crate::pool::SlotSpec;
    use crate::utils::ManualClock;
    use chrono::Duration as ChronoDuration;

    fn default_specs() -> Vec<SlotSpec> {
        vec![
            SlotSpec { id: 1, port: 7777 },
            SlotSpec { id: 2, port: 7778 },
            SlotSpec { id: 3, port: 7779 },
        ]
    }

    fn create_test_manager() -> (MatchManager, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let manager = MatchManager::new(
            ServerPool::new(&default_specs()).unwrap(),
            MatchRegistry::new(),
        )
        .with_clock(clock.clone());
        (manager, clock)
    }

    fn slot_of(manager: &MatchManager, server_id: u32) -> ServerSlot {
        manager
            .pool_snapshot()
            .unwrap()
            .into_iter()
            .find(|s| s.id == server_id)
            .unwrap()
    }

    #[test]
    fn test_create_reserves_slot_and_registers_match() {
        let (manager, _clock) = create_test_manager();

        let match_id = manager.create_match(Some("m1".to_string())).unwrap();
        assert_eq!(match_id, "m1");

        let record = manager.get_match("m1").unwrap().unwrap();
        assert_eq!(record.server_id, 1);
        assert!(record.players.is_empty());

        let slot = slot_of(&manager, 1);
        assert!(slot.busy);
        assert_eq!(slot.match_id.as_deref(), Some("m1"));
        manager.check_consistency().unwrap();
    }

    #[test]
    fn test_create_generates_id_when_absent() {
        let (manager, _clock) = create_test_manager();

        let a = manager.create_match(None).unwrap();
        let b = manager.create_match(None).unwrap();
        assert_ne!(a, b);
        assert!(manager.get_match(&a).unwrap().is_some());
    }

    #[test]
    fn test_pool_exhaustion_and_reuse() {
        let (manager, _clock) = create_test_manager();

        for id in ["m1", "m2", "m3"] {
            manager.create_match(Some(id.to_string())).unwrap();
        }

        let before = manager.pool_snapshot().unwrap();
        let err = manager.create_match(Some("m4".to_string())).unwrap_err();
        assert_eq!(
            as_allocator_error(&err),
            Some(&AllocatorError::NoAvailableServer)
        );
        assert_eq!(manager.pool_snapshot().unwrap(), before);
        assert!(manager.get_match("m4").unwrap().is_none());

        manager.terminate("m2").unwrap();
        let slot = slot_of(&manager, 2);
        assert!(!slot.busy);
        assert!(slot.match_id.is_none());

        manager.create_match(Some("m5".to_string())).unwrap();
        assert_eq!(manager.get_match("m5").unwrap().unwrap().server_id, 2);
        manager.check_consistency().unwrap();
    }

    #[test]
    fn test_duplicate_match_id_leaves_state_untouched() {
        let (manager, _clock) = create_test_manager();
        manager.create_match(Some("m1".to_string())).unwrap();

        let err = manager.create_match(Some("m1".to_string())).unwrap_err();
        assert!(matches!(
            as_allocator_error(&err),
            Some(AllocatorError::DuplicateMatch { .. })
        ));
        assert_eq!(manager.get_stats().unwrap().busy_slots, 1);
    }

    #[test]
    fn test_join_until_full() {
        let (manager, _clock) = create_test_manager();
        manager.create_match(Some("m1".to_string())).unwrap();

        let first = manager
            .attempt_join("m1", &Presence::new("userA"))
            .unwrap();
        assert!(first.is_accepted());
        assert_eq!(first.state().unwrap().players, vec!["userA".to_string()]);

        let second = manager
            .attempt_join("m1", &Presence::new("userB"))
            .unwrap();
        assert_eq!(
            second.state().unwrap().players,
            vec!["userA".to_string(), "userB".to_string()]
        );

        let third = manager
            .attempt_join("m1", &Presence::new("userC"))
            .unwrap();
        assert!(!third.is_accepted());
        assert_eq!(third.reject_reason(), Some("Match is full"));
        assert!(third.state().is_none());
        assert_eq!(manager.get_match("m1").unwrap().unwrap().players.len(), 2);
    }

    #[test]
    fn test_join_unknown_match_is_rejected() {
        let (manager, _clock) = create_test_manager();
        let outcome = manager
            .attempt_join("ghost", &Presence::new("userA"))
            .unwrap();
        assert_eq!(
            outcome,
            JoinOutcome::Rejected(JoinRejection::MatchNotFound)
        );
        assert_eq!(outcome.reject_reason(), Some("Match not found"));
    }

    #[test]
    fn test_terminate_is_idempotent() {
        let (manager, _clock) = create_test_manager();
        manager.create_match(Some("m1".to_string())).unwrap();
        manager.create_match(Some("m2".to_string())).unwrap();

        manager.terminate("m1").unwrap();
        assert!(manager.get_match("m1").unwrap().is_none());
        assert!(!slot_of(&manager, 1).busy);
        assert!(slot_of(&manager, 2).busy);

        manager.terminate("m1").unwrap();
        let stats = manager.get_stats().unwrap();
        assert_eq!(stats.matches_terminated, 1);
        assert_eq!(stats.busy_slots, 1);
    }

    #[test]
    fn test_tick_keeps_match_within_limit() {
        let (manager, clock) = create_test_manager();
        manager.create_match(Some("m1".to_string())).unwrap();
        let record = manager.get_match("m1").unwrap().unwrap();

        clock.advance(ChronoDuration::milliseconds(1_800_000));
        let next = manager.tick(record.clone()).unwrap();
        assert_eq!(next, Some(record));
        assert!(slot_of(&manager, 1).busy);
    }

    #[test]
    fn test_tick_expires_match_past_limit() {
        let (manager, clock) = create_test_manager();
        manager.create_match(Some("m1".to_string())).unwrap();
        let record = manager.get_match("m1").unwrap().unwrap();

        clock.advance(ChronoDuration::milliseconds(1_800_001));
        assert_eq!(manager.tick(record).unwrap(), None);
        assert!(manager.get_match("m1").unwrap().is_none());
        assert!(!slot_of(&manager, 1).busy);

        let stats = manager.get_stats().unwrap();
        assert_eq!(stats.matches_expired, 1);
    }

    #[test]
    fn test_stale_tick_leaves_recreated_match_alone() {
        let (manager, clock) = create_test_manager();
        manager.create_match(Some("m1".to_string())).unwrap();
        let stale = manager.get_match("m1").unwrap().unwrap();

        clock.advance(ChronoDuration::minutes(31));
        manager.terminate("m1").unwrap();
        manager.create_match(Some("m1".to_string())).unwrap();
        let fresh = manager.get_match("m1").unwrap().unwrap();
        assert_ne!(fresh.start_time, stale.start_time);

        assert_eq!(manager.tick(stale.clone()).unwrap(), Some(stale));
        assert_eq!(manager.get_match("m1").unwrap(), Some(fresh));
        assert!(slot_of(&manager, 1).busy);

        let stats = manager.get_stats().unwrap();
        assert_eq!(stats.matches_expired, 0);
        assert_eq!(stats.matches_terminated, 1);
        manager.check_consistency().unwrap();
    }

    #[test]
    fn test_tick_for_terminated_match_changes_nothing() {
        let (manager, clock) = create_test_manager();
        manager.create_match(Some("m1".to_string())).unwrap();
        manager.create_match(Some("m2".to_string())).unwrap();
        let stale = manager.get_match("m1").unwrap().unwrap();
        manager.terminate("m1").unwrap();

        clock.advance(ChronoDuration::minutes(31));
        assert_eq!(manager.tick(stale.clone()).unwrap(), Some(stale));
        assert!(manager.get_match("m2").unwrap().is_some());
        assert_eq!(manager.get_stats().unwrap().matches_expired, 0);
    }

    #[test]
    fn test_tick_uses_registered_start_time() {
        let (manager, clock) = create_test_manager();
        manager.create_match(Some("m1".to_string())).unwrap();
        let mut forged = manager.get_match("m1").unwrap().unwrap();
        forged.start_time = forged.start_time - ChronoDuration::hours(1);

        // A state that disagrees with the registry cannot force expiry
        assert_eq!(manager.tick(forged.clone()).unwrap(), Some(forged));
        assert!(manager.get_match("m1").unwrap().is_some());

        clock.advance(ChronoDuration::minutes(31));
        let record = manager.get_match("m1").unwrap().unwrap();
        assert_eq!(manager.tick(record).unwrap(), None);
        assert!(!slot_of(&manager, 1).busy);
    }

    #[test]
    fn test_tick_all_only_expires_old_matches() {
        let (manager, clock) = create_test_manager();
        manager.create_match(Some("old".to_string())).unwrap();
        clock.advance(ChronoDuration::minutes(20));
        manager.create_match(Some("new".to_string())).unwrap();
        clock.advance(ChronoDuration::minutes(11));

        assert_eq!(manager.tick_all().unwrap(), 1);
        assert!(manager.get_match("old").unwrap().is_none());
        assert!(manager.get_match("new").unwrap().is_some());
    }

    #[test]
    fn test_custom_max_duration() {
        let (manager, clock) = create_test_manager();
        let manager = manager.with_max_match_duration(Duration::from_secs(60));
        manager.create_match(Some("m1".to_string())).unwrap();

        clock.advance(ChronoDuration::seconds(61));
        assert_eq!(manager.tick_all().unwrap(), 1);
    }

    #[test]
    fn test_events_are_emitted() {
        let (dispatcher, mut receiver) = EventDispatcher::channel();
        let (manager, _clock) = create_test_manager();
        let manager = manager.with_events(dispatcher);

        manager.create_match(Some("m1".to_string())).unwrap();
        manager.attempt_join("m1", &Presence::new("a")).unwrap();
        manager.terminate("m1").unwrap();

        let kinds: Vec<&str> = std::iter::from_fn(|| receiver.try_recv().ok())
            .map(|event| event.kind())
            .collect();
        assert_eq!(kinds, vec!["MatchCreated", "PlayerJoined", "MatchTerminated"]);
    }

    #[test]
    fn test_stats_tracking() {
        let (manager, _clock) = create_test_manager();
        manager.create_match(Some("m1".to_string())).unwrap();
        manager.attempt_join("m1", &Presence::new("a")).unwrap();
        manager.attempt_join("nope", &Presence::new("b")).unwrap();

        let stats = manager.get_stats().unwrap();
        assert_eq!(stats.matches_created, 1);
        assert_eq!(stats.joins_accepted, 1);
        assert_eq!(stats.joins_rejected, 1);
        assert_eq!(stats.active_matches, 1);
        assert_eq!(stats.pool_size, 3);
    }

    #[test]
    fn test_metrics_integration() {
        let metrics_collector = Arc::new(MetricsCollector::new().unwrap());
        let (manager, _clock) = create_test_manager();
        let manager = manager.with_metrics(metrics_collector.clone());

        manager.create_match(Some("m1".to_string())).unwrap();
        assert_eq!(metrics_collector.pool().busy_slots.get(), 1);
        assert_eq!(metrics_collector.matches().active_matches.get(), 1);

        manager.terminate("m1").unwrap();
        assert_eq!(metrics_collector.pool().busy_slots.get(), 0);

        let metric_names: Vec<String> = metrics_collector
            .registry()
            .gather()
            .iter()
            .map(|mf| mf.get_name().to_string())
            .collect();
        assert!(
            metric_names.iter().any(|name| name.contains("matches_created")),
            "Should have match metrics, found: {:?}",
            metric_names
        );
    }

    #[test]
    fn test_consistency_check_detects_desync() {
        let (manager, _clock) = create_test_manager();
        manager.create_match(Some("m1".to_string())).unwrap();

        manager
            .shared_state()
            .write()
            .unwrap()
            .pool
            .release(1);
        assert!(manager.check_consistency().is_err());
    }
}
