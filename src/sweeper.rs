use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::engine::Engine;
use crate::store::LogStore;

/// Background task that periodically frees expired holds.
/// Runs until `shutdown` is cancelled.
pub async fn run_sweeper(engine: Arc<Engine>, period: Duration, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.cancelled() => {
                info!("sweeper stopped");
                return;
            }
        }
        match engine.sweep_expired().await {
            Ok(report) if !report.released.is_empty() || report.failed > 0 => {
                info!(
                    "sweep freed {} slots ({} stale, {} failed)",
                    report.released.len(),
                    report.stale,
                    report.failed
                );
            }
            Ok(_) => {}
            // Holds stay in place until a later pass succeeds
            Err(e) => warn!("sweep failed: {e}"),
        }
    }
}

/// Background task that rewrites the WAL once it has grown past `threshold`
/// appends since the last compaction.
pub async fn run_compactor(store: Arc<LogStore>, threshold: u64, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(Duration::from_secs(30));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.cancelled() => return,
        }
        let appends = store.appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        if let Err(e) = store.compact().await {
            warn!("WAL compaction failed after {appends} appends: {e}");
        }
    }
}
