//! Periodic tick driver
//!
//! Hosts that call `tick` themselves don't need this. The standalone service
//! uses it so expired matches release their servers without outside help.

use crate::lifecycle::manager::MatchManager;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info};

/// Spawn a task that ticks every live match once per `period`
///
/// The task exits when `shutdown` fires or its sender is dropped.
pub fn start_tick_task(
    manager: Arc<MatchManager>,
    period: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick_interval = interval(period);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Started match tick task (every {:?})", period);

        loop {
            tokio::select! {
                _ = tick_interval.tick() => {
                    match manager.tick_all() {
                        Ok(0) => {}
                        Ok(expired) => debug!("Tick pass expired {} matches", expired),
                        Err(e) => error!("Error during match tick: {}", e),
                    }
                }
                _ = shutdown.recv() => {
                    info!("Match tick task stopping");
                    break;
                }
            }
        }
    })
}
