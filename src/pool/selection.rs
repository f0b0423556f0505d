//! Slot selection policies
//!
//! The pool asks a selector which free slot to hand out next. The default
//! policy is a plain first-free scan in declared order.

use crate::types::ServerSlot;

/// Trait for choosing a slot to reserve
pub trait SlotSelector: Send + Sync {
    /// Index of the slot to reserve, or `None` when every slot is busy
    fn select(&self, slots: &[ServerSlot]) -> Option<usize>;

    /// Name used in logs
    fn name(&self) -> &'static str;
}

/// First free slot in declared order wins
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstFreeSelector;

impl SlotSelector for FirstFreeSelector {
    fn select(&self, slots: &[ServerSlot]) -> Option<usize> {
        slots.iter().position(|slot| !slot.busy)
    }

    fn name(&self) -> &'static str {
        "first-free"
    }
}
