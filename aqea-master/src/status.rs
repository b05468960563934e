//! Point-in-time status snapshot assembly

use std::sync::atomic::Ordering;

use chrono::Utc;

use aqea_common::api::{
    AllocatorStatus, ErrorCounters, StatusOverview, StatusProgress, StatusSnapshot, UnitStatus,
    UnitsStatus, WorkersStatus,
};
use aqea_common::model::{WorkUnitStatus, WorkerState};
use aqea_common::store::{AddressAllocator, CoordinationStore};
use aqea_common::Result;

use crate::AppState;

/// Assemble the `/api/status` snapshot from one consistent read of the
/// store plus the master-local error cache.
pub async fn build_snapshot(state: &AppState) -> Result<StatusSnapshot> {
    let units = state.store.list_units().await?;
    let workers = state.store.list_workers().await?;
    let allocation = state.store.allocation_stats().await?;
    let unit_errors = state.unit_errors.lock().await;

    let now = Utc::now();
    let runtime_hours = (now - state.started_at).num_seconds() as f64 / 3600.0;

    let total_processed: i64 = units
        .iter()
        .filter(|u| u.status == WorkUnitStatus::Completed || u.status.is_active())
        .map(|u| u.entries_processed)
        .sum();
    let current_rate: f64 = workers
        .iter()
        .filter(|w| w.state == WorkerState::Working)
        .map(|w| w.average_rate)
        .sum();
    let progress_percent = if state.total_estimated > 0 {
        (total_processed as f64 / state.total_estimated as f64 * 100.0).min(100.0)
    } else {
        0.0
    };
    let remaining = (state.total_estimated - total_processed).max(0);
    let eta_hours = if current_rate > 0.0 && remaining > 0 {
        Some(remaining as f64 / (current_rate * 60.0))
    } else {
        None
    };

    let count = |status: WorkUnitStatus| units.iter().filter(|u| u.status == status).count();
    let active_workers = workers
        .iter()
        .filter(|w| w.state == WorkerState::Working)
        .count();
    let idle_workers = workers
        .iter()
        .filter(|w| w.state == WorkerState::Idle)
        .count();
    let offline_workers = workers
        .iter()
        .filter(|w| w.state == WorkerState::Offline)
        .count();

    Ok(StatusSnapshot {
        overview: StatusOverview {
            language: state.language.clone(),
            source: state.source.clone(),
            started_at: state.started_at,
            runtime_hours: (runtime_hours * 100.0).round() / 100.0,
            status: if active_workers > 0 { "running" } else { "idle" }.to_string(),
        },
        progress: StatusProgress {
            total_estimated_entries: state.total_estimated,
            total_processed_entries: total_processed,
            progress_percent: (progress_percent * 100.0).round() / 100.0,
            current_rate_per_minute: (current_rate * 10.0).round() / 10.0,
            eta_hours: eta_hours.map(|h| (h * 10.0).round() / 10.0),
        },
        work_units: UnitsStatus {
            total: units.len(),
            pending: count(WorkUnitStatus::Pending),
            assigned: count(WorkUnitStatus::Assigned),
            processing: count(WorkUnitStatus::Processing),
            completed: count(WorkUnitStatus::Completed),
            failed: count(WorkUnitStatus::Failed),
            units: units
                .iter()
                .map(|u| UnitStatus {
                    work_id: u.work_id.clone(),
                    status: u.status,
                    assigned_worker: u.assigned_worker.clone(),
                    entries_processed: u.entries_processed,
                    estimated_entries: u.estimated_entries,
                    retry_count: u.retry_count,
                    last_error: u.last_error.clone(),
                    errors: unit_errors.get(&u.work_id).cloned().unwrap_or_default(),
                })
                .collect(),
        },
        workers: WorkersStatus {
            total: workers.len(),
            active: active_workers,
            idle: idle_workers,
            offline: offline_workers,
            details: workers,
        },
        errors: ErrorCounters {
            soft_errors: state.soft_errors.load(Ordering::Relaxed),
            hard_errors: state.hard_errors.load(Ordering::Relaxed),
        },
        allocator: AllocatorStatus {
            total_allocated: allocation.total_allocated,
            tuples_used: allocation.tuples_used,
        },
    })
}
