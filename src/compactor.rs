use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::store::MemoryStore;

/// Background task that rewrites the WAL once `threshold` appends have
/// accumulated since the last compaction. Runs until the task is dropped.
pub async fn run_compactor(store: Arc<MemoryStore>, threshold: u64, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        compact_if_due(&store, threshold).await;
    }
}

/// One compactor pass. Returns true if a compaction ran and succeeded.
pub async fn compact_if_due(store: &MemoryStore, threshold: u64) -> bool {
    let appends = store.appends_since_compact().await;
    if appends < threshold.max(1) {
        debug!("compactor: {appends} appends, below {threshold}");
        return false;
    }
    match store.compact().await {
        Ok(()) => {
            info!("compactor: compacted after {appends} appends");
            true
        }
        Err(e) => {
            warn!("compactor: compaction failed: {e}");
            false
        }
    }
}
