//! Storage backends
//!
//! Three concerns share one backend handle: the entry store (idempotent
//! upserts keyed by address), the coordination store (work units and worker
//! liveness), and the address allocator (unique A2 bytes per
//! `(AA, QQ, EE)` tuple). Backends are tried in configuration order at
//! startup and the first one that initializes is frozen for the process
//! lifetime.

mod memory;
mod postgres;
mod sqlite;

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use sqlite::SqliteStore;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{info, warn};

use crate::address::{AddressPattern, AqeaAddress};
use crate::config::{BackendConfig, StoreConfig};
use crate::model::{AqeaEntry, WorkUnit, WorkerRecord, WorkerState};
use crate::{Error, Result};

/// Outcome of a batch upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertStats {
    pub inserted: u64,
    pub updated: u64,
}

/// Allocator usage snapshot, surfaced through `/api/status`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllocationStats {
    pub total_allocated: u64,
    pub tuples_used: u64,
}

/// Outcome of one liveness sweep.
#[derive(Debug, Clone, Default)]
pub struct SweepOutcome {
    /// Units returned to `pending` after their worker went stale.
    pub reassigned: Vec<String>,
    /// Units moved to `failed` with their retry budget exhausted.
    pub failed: Vec<String>,
    /// Workers newly marked offline.
    pub offline_workers: Vec<String>,
}

/// Idempotent entry persistence, keyed by AQEA address.
#[async_trait]
pub trait EntryStore: Send + Sync {
    /// Upsert a batch atomically. On address conflict the original
    /// `created_at` is preserved, `updated_at` is overwritten, and `meta`
    /// keys are merged with incoming values replacing stored ones at the
    /// top level.
    async fn upsert_batch(&self, entries: &[AqeaEntry]) -> Result<UpsertStats>;

    async fn get_entry(&self, address: AqeaAddress) -> Result<Option<AqeaEntry>>;

    /// All entries whose address matches a prefix pattern such as
    /// `0xA0:01:*:*`, ordered by address.
    async fn query_entries(&self, pattern: &AddressPattern) -> Result<Vec<AqeaEntry>>;
}

/// Collision-free element-ID allocation under concurrent writers.
#[async_trait]
pub trait AddressAllocator: Send + Sync {
    /// Reserve (or re-read) the A2 byte for `lemma_key` within
    /// `(aa, qq, ee)`. Stable: the same key always yields the same byte.
    /// `preferred` is a deterministic seed hint; the allocator probes
    /// upward from it when taken. Fails with `AddressSpaceExhausted` once
    /// all of `[0x01, 0xFE]` is taken for the tuple.
    async fn allocate(
        &self,
        aa: u8,
        qq: u8,
        ee: u8,
        lemma_key: &str,
        preferred: u8,
        allocated_by: &str,
    ) -> Result<u8>;

    async fn allocation_stats(&self) -> Result<AllocationStats>;
}

/// Work units, worker liveness, and progress. All state transitions on a
/// single unit are linearized by the backend.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Transactional and idempotent by `work_id`; existing units are left
    /// untouched so a master restart never resets progress.
    async fn create_work_units(&self, units: &[WorkUnit]) -> Result<()>;

    /// Atomically claim the oldest pending unit for a worker, ties broken
    /// by ascending `work_id`.
    async fn claim_next_pending(
        &self,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<WorkUnit>>;

    /// The unit a worker currently owns in `assigned | processing`, if any.
    async fn active_unit_for(&self, worker_id: &str) -> Result<Option<WorkUnit>>;

    /// Record cumulative progress. Fails with `CoordinationConflict` unless
    /// `worker_id` owns the unit and it is active. The first report moves
    /// the unit from `assigned` to `processing`.
    async fn update_progress(
        &self,
        work_id: &str,
        worker_id: &str,
        entries_processed: i64,
        rate: f64,
        now: DateTime<Utc>,
    ) -> Result<()>;

    /// Terminal transition. Repeating a completion with the same final
    /// count is accepted; a different count wins but is logged.
    async fn complete(
        &self,
        work_id: &str,
        worker_id: &str,
        final_count: i64,
        success: bool,
        now: DateTime<Utc>,
    ) -> Result<()>;

    async fn register_worker(
        &self,
        worker_id: &str,
        ip: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()>;

    async fn heartbeat(
        &self,
        worker_id: &str,
        state: WorkerState,
        current_work_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()>;

    /// Mark stale workers offline, return their active units to `pending`
    /// (or `failed` past the retry budget), and drop workers that have
    /// been offline longer than `worker_ttl`.
    async fn sweep_stale(
        &self,
        now: DateTime<Utc>,
        heartbeat_timeout: Duration,
        worker_ttl: Duration,
    ) -> Result<SweepOutcome>;

    async fn list_units(&self) -> Result<Vec<WorkUnit>>;

    async fn list_workers(&self) -> Result<Vec<WorkerRecord>>;

    /// Cheap reachability probe for `/api/health`.
    async fn ping(&self) -> Result<()>;
}

/// The full backend surface. Every backend implements all three concerns;
/// callers borrow the facet they need.
pub trait Store: EntryStore + AddressAllocator + CoordinationStore {}

impl<T: EntryStore + AddressAllocator + CoordinationStore> Store for T {}

/// The allocator facet of a shared store handle, for callers that only
/// reserve element IDs.
pub struct AllocatorHandle(pub Arc<dyn Store>);

#[async_trait]
impl AddressAllocator for AllocatorHandle {
    async fn allocate(
        &self,
        aa: u8,
        qq: u8,
        ee: u8,
        lemma_key: &str,
        preferred: u8,
        allocated_by: &str,
    ) -> Result<u8> {
        self.0
            .allocate(aa, qq, ee, lemma_key, preferred, allocated_by)
            .await
    }

    async fn allocation_stats(&self) -> Result<AllocationStats> {
        self.0.allocation_stats().await
    }
}

/// Try the configured backends in order, falling back with a logged
/// warning, and freeze the first that initializes.
pub async fn open_with_fallback(config: &StoreConfig) -> Result<Arc<dyn Store>> {
    for backend in &config.backends {
        match backend {
            BackendConfig::Postgres { url } => match PgStore::connect(url).await {
                Ok(store) => {
                    info!("storage backend: postgres");
                    return Ok(Arc::new(store));
                }
                Err(e) => warn!(error = %e, "postgres backend unavailable, falling back"),
            },
            BackendConfig::Sqlite { path } => match SqliteStore::open(path).await {
                Ok(store) => {
                    info!(path = %path.display(), "storage backend: sqlite");
                    return Ok(Arc::new(store));
                }
                Err(e) => warn!(error = %e, "sqlite backend unavailable, falling back"),
            },
            BackendConfig::Memory => {
                info!("storage backend: in-memory");
                return Ok(Arc::new(MemoryStore::new()));
            }
        }
    }
    Err(Error::StorePersistent(
        "no storage backend could be initialized".into(),
    ))
}

/// Retry a transient-failure-prone operation with exponential backoff:
/// 200 ms base, doubling, capped at 10 s, five attempts.
pub async fn with_backoff<T, F, Fut>(label: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    const MAX_ATTEMPTS: u32 = 5;
    let mut delay = Duration::from_millis(200);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < MAX_ATTEMPTS => {
                warn!(attempt, error = %e, "{label} failed, backing off");
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(Duration::from_secs(10));
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Top-level merge of two meta objects: incoming keys replace stored keys,
/// stored keys absent from the incoming object survive. No deep merge.
pub(crate) fn merge_meta(stored: &Value, incoming: &Value) -> Value {
    match (stored, incoming) {
        (Value::Object(old), Value::Object(new)) => {
            let mut merged = old.clone();
            for (key, value) in new {
                merged.insert(key.clone(), value.clone());
            }
            Value::Object(merged)
        }
        _ => incoming.clone(),
    }
}
