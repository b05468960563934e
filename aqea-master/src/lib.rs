//! aqea-master library - distributed extraction coordinator
//!
//! Partitions a language plan into work units, hands them to workers over
//! HTTP, tracks liveness via heartbeats, and reassigns units when a worker
//! goes silent. All persistent state lives in the shared store; the only
//! master-local state is the per-unit soft-error cache surfaced through
//! `/api/status`.

use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use aqea_common::api::WorkError;
use aqea_common::config::MasterConfig;
use aqea_common::store::Store;

pub mod api;
pub mod plan;
pub mod status;
pub mod sweep;

/// Application state shared across HTTP handlers and the sweep task.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub language: String,
    pub source: String,
    pub started_at: DateTime<Utc>,
    pub total_estimated: i64,
    pub heartbeat_timeout: Duration,
    pub worker_ttl: Duration,
    /// Soft errors reported by workers since startup.
    pub soft_errors: Arc<AtomicU64>,
    /// Hard errors observed by the master (store failures past retry).
    pub hard_errors: Arc<AtomicU64>,
    /// Soft errors per unit, as reported in progress bodies.
    pub unit_errors: Arc<Mutex<HashMap<String, Vec<WorkError>>>>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, config: &MasterConfig, total_estimated: i64) -> Self {
        Self {
            store,
            language: config.plan.language_code.clone(),
            source: config.source.clone(),
            started_at: Utc::now(),
            total_estimated,
            heartbeat_timeout: Duration::from_secs(config.heartbeat_timeout_secs),
            worker_ttl: Duration::from_secs(config.worker_ttl_secs),
            soft_errors: Arc::new(AtomicU64::new(0)),
            hard_errors: Arc::new(AtomicU64::new(0)),
            unit_errors: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

/// Build the application router with the full coordination surface.
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post};

    Router::new()
        .route("/api/register", post(api::register))
        .route("/api/work", get(api::get_work))
        .route("/api/work/:work_id/progress", post(api::post_progress))
        .route("/api/work/:work_id/complete", post(api::post_complete))
        .route("/api/heartbeat", post(api::post_heartbeat))
        .route("/api/status", get(api::get_status))
        .route("/api/health", get(api::get_health))
        .with_state(state)
}
