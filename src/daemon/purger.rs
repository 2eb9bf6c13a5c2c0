use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::storage::JobRepository;

/// Evict expired terminal jobs every `interval` until `cancel` fires.
pub async fn run_purger(
    repo: Arc<JobRepository>,
    retention: Duration,
    interval: Duration,
    cancel: CancellationToken,
) {
    tracing::debug!(?retention, ?interval, "Purger started");
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let purged = repo.purge_stopped(retention);
                if purged > 0 {
                    tracing::info!(purged, remaining = repo.len(), "Purged stopped jobs");
                }
            }
        }
    }
    tracing::debug!("Purger stopped");
}
