//! Heartbeat loop
//!
//! Runs as an independent task so conversion or store stalls never silence
//! the worker. Reads the pipeline's shared status and posts it every 30
//! seconds until shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, RwLock};
use tokio::time::interval;
use tracing::{debug, warn};

use aqea_common::model::WorkerState;

use crate::master_client::MasterClient;

/// Heartbeat cadence.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Status shared between the pipeline and the heartbeat loop.
#[derive(Debug, Clone)]
pub struct WorkerStatus {
    pub state: WorkerState,
    pub current_work_id: Option<String>,
}

impl Default for WorkerStatus {
    fn default() -> Self {
        Self {
            state: WorkerState::Idle,
            current_work_id: None,
        }
    }
}

pub fn spawn_heartbeat(
    client: MasterClient,
    worker_id: String,
    status: Arc<RwLock<WorkerStatus>>,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(HEARTBEAT_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        debug!("heartbeat loop stopping");
                        return;
                    }
                }
            }
            let snapshot = status.read().await.clone();
            if let Err(e) = client
                .heartbeat(&worker_id, snapshot.state, snapshot.current_work_id.as_deref())
                .await
            {
                warn!(error = %e, "heartbeat failed");
            }
        }
    })
}
