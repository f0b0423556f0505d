//! Property tests: random operation sequences never break pool/registry pairing

use match_allocator::lifecycle::{MatchLifecycle, MatchManager};
use match_allocator::pool::{ServerPool, SlotSpec};
use match_allocator::registry::MatchRegistry;
use match_allocator::types::{Presence, MAX_PLAYERS_PER_MATCH};
use match_allocator::utils::ManualClock;
use proptest::prelude::*;
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Op {
    Create(u8),
    Join(u8, u8),
    Terminate(u8),
    Advance(u16),
    TickAll,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0u8..12).prop_map(Op::Create),
        3 => (0u8..12, 0u8..5).prop_map(|(m, u)| Op::Join(m, u)),
        2 => (0u8..12).prop_map(Op::Terminate),
        1 => (0u16..1200).prop_map(Op::Advance),
        1 => Just(Op::TickAll),
    ]
}

fn build_manager(slots: u32) -> (MatchManager, Arc<ManualClock>) {
    let specs: Vec<SlotSpec> = (1..=slots)
        .map(|id| SlotSpec {
            id,
            port: 9000 + id as u16,
        })
        .collect();
    let clock = Arc::new(ManualClock::default());
    let manager = MatchManager::new(ServerPool::new(&specs).unwrap(), MatchRegistry::new())
        .with_clock(clock.clone());
    (manager, clock)
}

proptest! {
    #[test]
    fn pool_and_registry_stay_paired(
        slots in 1u32..6,
        ops in proptest::collection::vec(op_strategy(), 1..80),
    ) {
        let (manager, clock) = build_manager(slots);

        for op in ops {
            match op {
                Op::Create(m) => {
                    let _ = manager.create_match(Some(format!("m{}", m)));
                }
                Op::Join(m, u) => {
                    manager
                        .attempt_join(&format!("m{}", m), &Presence::new(format!("u{}", u)))
                        .unwrap();
                }
                Op::Terminate(m) => manager.terminate(&format!("m{}", m)).unwrap(),
                Op::Advance(seconds) => {
                    clock.advance(chrono::Duration::seconds(i64::from(seconds)))
                }
                Op::TickAll => {
                    manager.tick_all().unwrap();
                }
            }

            prop_assert!(manager.check_consistency().is_ok());

            let stats = manager.get_stats().unwrap();
            prop_assert!(stats.busy_slots <= stats.pool_size);
            prop_assert_eq!(stats.busy_slots, stats.active_matches);

            for record in manager.list_matches().unwrap() {
                prop_assert!(record.players.len() <= MAX_PLAYERS_PER_MATCH);
            }
        }
    }

    #[test]
    fn allocation_fills_lowest_free_slot_first(slots in 1u32..10) {
        let (manager, _clock) = build_manager(slots);

        for expected in 1..=slots {
            let match_id = manager.create_match(None).unwrap();
            let record = manager.get_match(&match_id).unwrap().unwrap();
            prop_assert_eq!(record.server_id, expected);
        }
        prop_assert!(manager.create_match(None).is_err());
    }
}
