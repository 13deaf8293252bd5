//! Periodic liveness sweep.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::domain::ServerRegistry;

const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Spawns a task that sweeps `registry` every `period` until `shutdown`
/// is cancelled.
///
/// The first sweep runs immediately. Ticks are scheduled at a fixed rate;
/// a slow sweep causes missed ticks to be skipped rather than delaying
/// the schedule. Cancellation never interrupts a sweep already running.
pub fn spawn_sweeper(
    registry: Arc<ServerRegistry>,
    period: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period.max(MIN_PERIOD));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let evicted = registry.sweep().await;
                    if !evicted.is_empty() {
                        tracing::debug!(count = evicted.len(), "sweep finished");
                    }
                }
            }
        }
        tracing::debug!("sweeper stopped");
    })
}
