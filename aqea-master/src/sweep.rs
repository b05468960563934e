//! Background tasks: liveness sweep and status log
//!
//! Two independent loops. The sweep marks silent workers offline and
//! returns their units to the pending queue (or fails them past the retry
//! budget) at its configured cadence. The status log reports progress
//! every 10 seconds while any worker is active, regardless of how the
//! sweep is tuned.

use std::sync::atomic::Ordering;

use aqea_common::store::CoordinationStore;
use chrono::Utc;
use tokio::time::{interval, Duration};
use tracing::{info, warn};

use crate::status::build_snapshot;
use crate::AppState;

/// Cadence of the progress log line.
const STATUS_LOG_INTERVAL: Duration = Duration::from_secs(10);

/// Spawn the sweep loop. Runs until the process exits.
pub fn spawn_sweep(state: AppState, sweep_interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = interval(sweep_interval);
        info!(
            interval_secs = sweep_interval.as_secs(),
            "liveness sweep started"
        );
        loop {
            ticker.tick().await;
            run_sweep_once(&state).await;
        }
    });
}

/// Spawn the status-log loop. Emits a progress line every 10 seconds while
/// extraction is active; silent otherwise.
pub fn spawn_status_log(state: AppState) {
    tokio::spawn(async move {
        let mut ticker = interval(STATUS_LOG_INTERVAL);
        loop {
            ticker.tick().await;
            match build_snapshot(&state).await {
                Ok(snapshot) if snapshot.workers.active > 0 => {
                    info!(
                        progress_percent = snapshot.progress.progress_percent,
                        active_workers = snapshot.workers.active,
                        rate_per_minute = snapshot.progress.current_rate_per_minute,
                        "extraction progress"
                    );
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "could not assemble progress snapshot"),
            }
        }
    });
}

async fn run_sweep_once(state: &AppState) {
    let outcome = match state
        .store
        .sweep_stale(Utc::now(), state.heartbeat_timeout, state.worker_ttl)
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(error = %e, "liveness sweep failed");
            state.hard_errors.fetch_add(1, Ordering::Relaxed);
            return;
        }
    };

    for worker_id in &outcome.offline_workers {
        warn!(%worker_id, "worker missed heartbeat timeout, marked offline");
    }
    for work_id in &outcome.reassigned {
        warn!(%work_id, "unit returned to pending after worker timeout");
    }
    for work_id in &outcome.failed {
        warn!(%work_id, "unit failed after exhausting retries");
    }
}
