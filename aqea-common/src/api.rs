//! HTTP API wire types shared by the master service and the worker client
//!
//! Everything here serializes to JSON (UTF-8). Timestamps are RFC 3339
//! strings; single bytes appear as `0xHH` strings and full addresses in the
//! canonical `0xAA:QQ:EE:A2` form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{WorkerRecord, WorkUnit, WorkUnitStatus};

/// `POST /api/register` request body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisterRequest {
    /// Stable id supplied by the worker; the master mints one when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Value>,
}

/// `POST /api/register` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub worker_id: String,
    pub assigned_at: DateTime<Utc>,
}

/// `GET /api/work` 200 response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkResponse {
    pub work_id: String,
    pub language: String,
    pub source: String,
    pub range_start: String,
    pub range_end: String,
    pub estimated_entries: i64,
}

impl From<&WorkUnit> for WorkResponse {
    fn from(unit: &WorkUnit) -> Self {
        Self {
            work_id: unit.work_id.clone(),
            language: unit.language.clone(),
            source: unit.source.clone(),
            range_start: unit.range_start.clone(),
            range_end: unit.range_end.clone(),
            estimated_entries: unit.estimated_entries,
        }
    }
}

/// One soft error reported alongside progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkError {
    pub kind: String,
    pub detail: String,
}

/// `POST /api/work/{work_id}/progress` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressRequest {
    pub worker_id: String,
    /// Cumulative for the current assignment of this unit.
    pub entries_processed: i64,
    /// EWMA entries per minute.
    pub current_rate: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<WorkError>,
    /// Set on the final progress report of an interrupted worker.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub aborting: bool,
}

/// `POST /api/work/{work_id}/complete` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteRequest {
    pub worker_id: String,
    pub entries_processed: i64,
    pub success: bool,
}

/// `POST /api/heartbeat` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub worker_id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_work_id: Option<String>,
}

/// Generic acknowledgement body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

/// `GET /api/health` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
}

/// `GET /api/status` run overview block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusOverview {
    pub language: String,
    pub source: String,
    pub started_at: DateTime<Utc>,
    pub runtime_hours: f64,
    pub status: String,
}

/// `GET /api/status` aggregate progress block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusProgress {
    pub total_estimated_entries: i64,
    pub total_processed_entries: i64,
    pub progress_percent: f64,
    pub current_rate_per_minute: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_hours: Option<f64>,
}

/// `GET /api/status` one unit with its reported soft errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitStatus {
    pub work_id: String,
    pub status: WorkUnitStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_worker: Option<String>,
    pub entries_processed: i64,
    pub estimated_entries: i64,
    pub retry_count: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<WorkError>,
}

/// `GET /api/status` work unit rollup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitsStatus {
    pub total: usize,
    pub pending: usize,
    pub assigned: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub units: Vec<UnitStatus>,
}

/// `GET /api/status` worker roster rollup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkersStatus {
    pub total: usize,
    pub active: usize,
    pub idle: usize,
    pub offline: usize,
    pub details: Vec<WorkerRecord>,
}

/// `GET /api/status` error counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorCounters {
    pub soft_errors: u64,
    pub hard_errors: u64,
}

/// `GET /api/status` allocator usage block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AllocatorStatus {
    pub total_allocated: u64,
    pub tuples_used: u64,
}

/// `GET /api/status` full snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub overview: StatusOverview,
    pub progress: StatusProgress,
    pub work_units: UnitsStatus,
    pub workers: WorkersStatus,
    pub errors: ErrorCounters,
    pub allocator: AllocatorStatus,
}
