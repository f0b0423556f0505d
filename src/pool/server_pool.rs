//! Fixed pool of dedicated server slots
//!
//! The pool owns every `ServerSlot`. Slots are created once from configuration
//! and flip between free and busy for the lifetime of the process.

use crate::error::{AllocatorError, Result};
use crate::pool::selection::{FirstFreeSelector, SlotSelector};
use crate::types::{MatchId, ServerId, ServerSlot};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Static description of one slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SlotSpec {
    pub id: ServerId,
    pub port: u16,
}

/// Allocatable backend slots in declared order
pub struct ServerPool {
    slots: Vec<ServerSlot>,
    selector: Arc<dyn SlotSelector>,
}

impl std::fmt::Debug for ServerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerPool")
            .field("slots", &self.slots)
            .field("selector", &self.selector.name())
            .finish()
    }
}

impl ServerPool {
    /// Build a pool from slot specs using the first-free policy
    pub fn new(specs: &[SlotSpec]) -> Result<Self> {
        Self::with_selector(specs, Arc::new(FirstFreeSelector))
    }

    /// Build a pool with a custom selection policy
    pub fn with_selector(specs: &[SlotSpec], selector: Arc<dyn SlotSelector>) -> Result<Self> {
        if specs.is_empty() {
            return Err(AllocatorError::ConfigurationError {
                message: "Server pool must contain at least one slot".to_string(),
            }
            .into());
        }

        let mut ids = HashSet::new();
        let mut ports = HashSet::new();
        for spec in specs {
            if !ids.insert(spec.id) {
                return Err(AllocatorError::ConfigurationError {
                    message: format!("Duplicate server id in pool: {}", spec.id),
                }
                .into());
            }
            if !ports.insert(spec.port) {
                return Err(AllocatorError::ConfigurationError {
                    message: format!("Duplicate server port in pool: {}", spec.port),
                }
                .into());
            }
        }

        Ok(Self {
            slots: specs
                .iter()
                .map(|spec| ServerSlot::new(spec.id, spec.port))
                .collect(),
            selector,
        })
    }

    /// Reserve a free slot for `match_id`; `None` leaves the pool untouched
    pub fn find_and_reserve(&mut self, match_id: &str) -> Option<ServerSlot> {
        let index = self.selector.select(&self.slots)?;
        let slot = self.slots.get_mut(index)?;
        if slot.busy {
            // a selector must never hand out a busy slot
            return None;
        }

        slot.busy = true;
        slot.match_id = Some(match_id.to_string());
        debug!(
            "Reserved server {} (port {}) for match {} via {}",
            slot.id,
            slot.port,
            match_id,
            self.selector.name()
        );
        Some(slot.clone())
    }

    /// Free a slot; unknown ids are ignored
    pub fn release(&mut self, server_id: ServerId) {
        if let Some(slot) = self.slots.iter_mut().find(|s| s.id == server_id) {
            slot.busy = false;
            slot.match_id = None;
            debug!("Released server {} (port {})", slot.id, slot.port);
        }
    }

    pub fn lookup(&self, server_id: ServerId) -> Option<&ServerSlot> {
        self.slots.iter().find(|s| s.id == server_id)
    }

    /// Slot currently assigned to a match
    pub fn slot_for_match(&self, match_id: &MatchId) -> Option<&ServerSlot> {
        self.slots
            .iter()
            .find(|s| s.match_id.as_ref() == Some(match_id))
    }

    pub fn slots(&self) -> &[ServerSlot] {
        &self.slots
    }

    pub fn size(&self) -> usize {
        self.slots.len()
    }

    pub fn busy_count(&self) -> usize {
        self.slots.iter().filter(|s| s.busy).count()
    }

    pub fn free_count(&self) -> usize {
        self.size() - self.busy_count()
    }
}
