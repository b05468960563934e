//! HTTP handlers for the coordination API
//!
//! Wire contract:
//! - `POST /api/register` - register a worker, minting an id if none given
//! - `GET  /api/work?worker_id=W` - atomically claim the next pending unit
//! - `POST /api/work/{work_id}/progress` - cumulative progress report
//! - `POST /api/work/{work_id}/complete` - terminal transition
//! - `POST /api/heartbeat` - liveness signal
//! - `GET  /api/status` - point-in-time snapshot
//! - `GET  /api/health` - store reachability probe

use std::sync::atomic::Ordering;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use aqea_common::api::{
    CompleteRequest, HealthResponse, HeartbeatRequest, OkResponse, ProgressRequest,
    RegisterRequest, RegisterResponse, WorkResponse,
};
use aqea_common::model::WorkerState;
use aqea_common::store::{with_backoff, CoordinationStore};
use aqea_common::Error;

use crate::status::build_snapshot;
use crate::AppState;

/// Error wrapper mapping the shared error taxonomy onto HTTP statuses.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            Error::CoordinationConflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Error::InvalidInput(_) | Error::Config(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Error::StoreTransient(_) | Error::StorePersistent(_) | Error::Database(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "STORE_UNAVAILABLE")
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };
        let body = Json(json!({
            "error": { "code": code, "message": self.0.to_string() }
        }));
        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> ApiResult<Json<RegisterResponse>> {
    let worker_id = payload
        .worker_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| format!("worker-{}", &uuid::Uuid::new_v4().simple().to_string()[..8]));
    let now = Utc::now();
    with_backoff("register_worker", || {
        state.store.register_worker(&worker_id, None, now)
    })
    .await?;
    info!(%worker_id, "registered worker");
    Ok(Json(RegisterResponse {
        worker_id,
        assigned_at: now,
    }))
}

#[derive(Debug, Deserialize)]
pub struct WorkQuery {
    pub worker_id: String,
}

pub async fn get_work(
    State(state): State<AppState>,
    Query(query): Query<WorkQuery>,
) -> ApiResult<Response> {
    let worker_id = query.worker_id;
    if let Some(active) = with_backoff("active_unit_for", || {
        state.store.active_unit_for(&worker_id)
    })
    .await?
    {
        return Err(Error::CoordinationConflict(format!(
            "{worker_id} already owns active unit {}",
            active.work_id
        ))
        .into());
    }
    let now = Utc::now();
    let claimed = with_backoff("claim_next_pending", || {
        state.store.claim_next_pending(&worker_id, now)
    })
    .await?;
    match claimed {
        Some(unit) => {
            info!(%worker_id, work_id = %unit.work_id, "assigned work unit");
            Ok(Json(WorkResponse::from(&unit)).into_response())
        }
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

pub async fn post_progress(
    State(state): State<AppState>,
    Path(work_id): Path<String>,
    Json(payload): Json<ProgressRequest>,
) -> ApiResult<Json<OkResponse>> {
    let now = Utc::now();
    with_backoff("update_progress", || {
        state.store.update_progress(
            &work_id,
            &payload.worker_id,
            payload.entries_processed,
            payload.current_rate,
            now,
        )
    })
    .await?;

    if !payload.errors.is_empty() {
        state
            .soft_errors
            .fetch_add(payload.errors.len() as u64, Ordering::Relaxed);
        let mut unit_errors = state.unit_errors.lock().await;
        unit_errors
            .entry(work_id.clone())
            .or_default()
            .extend(payload.errors.iter().cloned());
    }
    if payload.aborting {
        warn!(
            %work_id,
            worker_id = %payload.worker_id,
            "worker aborting unit; sweep will reassign after heartbeat timeout"
        );
    }
    Ok(Json(OkResponse { ok: true }))
}

pub async fn post_complete(
    State(state): State<AppState>,
    Path(work_id): Path<String>,
    Json(payload): Json<CompleteRequest>,
) -> ApiResult<Json<OkResponse>> {
    let now = Utc::now();
    with_backoff("complete", || {
        state.store.complete(
            &work_id,
            &payload.worker_id,
            payload.entries_processed,
            payload.success,
            now,
        )
    })
    .await?;
    info!(
        %work_id,
        worker_id = %payload.worker_id,
        entries = payload.entries_processed,
        success = payload.success,
        "work unit finished"
    );
    Ok(Json(OkResponse { ok: true }))
}

pub async fn post_heartbeat(
    State(state): State<AppState>,
    Json(payload): Json<HeartbeatRequest>,
) -> ApiResult<Json<OkResponse>> {
    let state_value = WorkerState::parse(&payload.status)
        .map_err(|_| Error::InvalidInput(format!("unknown worker status '{}'", payload.status)))?;
    with_backoff("heartbeat", || {
        state.store.heartbeat(
            &payload.worker_id,
            state_value,
            payload.current_work_id.as_deref(),
            Utc::now(),
        )
    })
    .await?;
    Ok(Json(OkResponse { ok: true }))
}

pub async fn get_status(State(state): State<AppState>) -> ApiResult<Response> {
    let snapshot = build_snapshot(&state).await?;
    Ok(Json(snapshot).into_response())
}

pub async fn get_health(State(state): State<AppState>) -> Response {
    match state.store.ping().await {
        Ok(()) => Json(HealthResponse {
            status: "healthy".to_string(),
            module: "aqea-master".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        })
        .into_response(),
        Err(e) => {
            warn!(error = %e, "health probe failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable", "module": "aqea-master" })),
            )
                .into_response()
        }
    }
}
