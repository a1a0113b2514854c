//! Background deletion of aged alerts and their send records.

use alerthub_storage::AlertStore;
use chrono::{Duration, Utc};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::time;

const STARTUP_DELAY: StdDuration = StdDuration::from_secs(60);
const SWEEP_INTERVAL: StdDuration = StdDuration::from_secs(24 * 3600);

/// Wait a minute after startup, sweep once, then repeat daily. The
/// retention setting is re-read from the store on every cycle.
pub async fn run_retention_loop(store: Arc<AlertStore>) {
    time::sleep(STARTUP_DELAY).await;
    let mut tick = time::interval(SWEEP_INTERVAL);
    loop {
        tick.tick().await;
        run_retention_cleanup(&store).await;
    }
}

/// Delete alerts older than the retention cutoff; their send records go
/// first so no orphaned log rows remain.
pub async fn run_retention_cleanup(store: &AlertStore) {
    let retention_days = store.retention_days().await;
    let cutoff = Utc::now() - Duration::days(retention_days as i64);

    let ids = match store.list_alert_ids_created_before(cutoff).await {
        Ok(ids) => ids,
        Err(e) => {
            tracing::error!(error = %e, "retention: listing old alerts failed");
            return;
        }
    };
    if ids.is_empty() {
        return;
    }

    if let Err(e) = store.delete_send_records_for(&ids).await {
        tracing::error!(error = %e, "retention: deleting send records failed");
        return;
    }
    match store.delete_alerts_created_before(cutoff).await {
        Ok(removed) => {
            tracing::info!(removed, retention_days, "retention sweep completed");
        }
        Err(e) => {
            tracing::error!(error = %e, "retention: deleting alerts failed");
        }
    }
}
