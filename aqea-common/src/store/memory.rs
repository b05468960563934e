//! In-memory backend
//!
//! Single-process fallback used by the master in HTTP-only deployments and
//! by tests. One store-wide mutex is sufficient since the master is the
//! only writer.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::address::{AddressPattern, AqeaAddress, A2_MAX, A2_MIN};
use crate::model::{AqeaEntry, EntryMeta, WorkUnit, WorkUnitStatus, WorkerRecord, WorkerState};
use crate::{Error, Result};

use super::{
    merge_meta, AddressAllocator, AllocationStats, CoordinationStore, EntryStore, SweepOutcome,
    UpsertStats,
};

#[derive(Default)]
struct MemoryInner {
    /// Keyed by canonical address string so iteration is address-ordered.
    entries: BTreeMap<String, AqeaEntry>,
    /// Keyed by work_id; ids are generated in creation order so map order
    /// doubles as claim order.
    units: BTreeMap<String, WorkUnit>,
    workers: HashMap<String, WorkerRecord>,
    /// `(aa, qq, ee) -> lemma_key -> a2`
    allocations: HashMap<(u8, u8, u8), HashMap<String, u8>>,
}

pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MemoryInner::default()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EntryStore for MemoryStore {
    async fn upsert_batch(&self, entries: &[AqeaEntry]) -> Result<UpsertStats> {
        let mut inner = self.inner.lock().await;
        let mut stats = UpsertStats::default();
        for entry in entries {
            entry.validate()?;
            let key = entry.address.to_string();
            if inner.entries.contains_key(&key) {
                let stored = inner.entries.get_mut(&key).expect("checked above");
                let merged = merge_meta(
                    &serde_json::to_value(&stored.meta)?,
                    &serde_json::to_value(&entry.meta)?,
                );
                stored.meta = serde_json::from_value::<EntryMeta>(merged)?;
                stored.label = entry.label.clone();
                stored.description = entry.description.clone();
                stored.domain = entry.domain.clone();
                stored.status = entry.status.clone();
                stored.lang_ui = entry.lang_ui.clone();
                stored.relations = entry.relations.clone();
                stored.updated_at = entry.updated_at;
                stats.updated += 1;
            } else {
                inner.entries.insert(key, entry.clone());
                stats.inserted += 1;
            }
        }
        Ok(stats)
    }

    async fn get_entry(&self, address: AqeaAddress) -> Result<Option<AqeaEntry>> {
        let inner = self.inner.lock().await;
        Ok(inner.entries.get(&address.to_string()).cloned())
    }

    async fn query_entries(&self, pattern: &AddressPattern) -> Result<Vec<AqeaEntry>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .entries
            .values()
            .filter(|e| pattern.matches(&e.address))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AddressAllocator for MemoryStore {
    async fn allocate(
        &self,
        aa: u8,
        qq: u8,
        ee: u8,
        lemma_key: &str,
        preferred: u8,
        _allocated_by: &str,
    ) -> Result<u8> {
        let mut inner = self.inner.lock().await;
        let tuple = inner.allocations.entry((aa, qq, ee)).or_default();
        if let Some(a2) = tuple.get(lemma_key) {
            return Ok(*a2);
        }
        let used: HashSet<u8> = tuple.values().copied().collect();
        if used.len() >= (A2_MAX - A2_MIN + 1) as usize {
            return Err(Error::AddressSpaceExhausted { aa, qq, ee });
        }
        let mut candidate = preferred.clamp(A2_MIN, A2_MAX);
        while used.contains(&candidate) {
            candidate = if candidate == A2_MAX { A2_MIN } else { candidate + 1 };
        }
        tuple.insert(lemma_key.to_string(), candidate);
        debug!(
            "allocated 0x{aa:02X}:{qq:02X}:{ee:02X}:{candidate:02X} for '{lemma_key}'"
        );
        Ok(candidate)
    }

    async fn allocation_stats(&self) -> Result<AllocationStats> {
        let inner = self.inner.lock().await;
        Ok(AllocationStats {
            total_allocated: inner.allocations.values().map(|t| t.len() as u64).sum(),
            tuples_used: inner.allocations.len() as u64,
        })
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn create_work_units(&self, units: &[WorkUnit]) -> Result<()> {
        let mut inner = self.inner.lock().await;
        for unit in units {
            inner
                .units
                .entry(unit.work_id.clone())
                .or_insert_with(|| unit.clone());
        }
        Ok(())
    }

    async fn claim_next_pending(
        &self,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<WorkUnit>> {
        let mut inner = self.inner.lock().await;
        let next_id = inner
            .units
            .values()
            .find(|u| u.status == WorkUnitStatus::Pending)
            .map(|u| u.work_id.clone());
        let Some(work_id) = next_id else {
            return Ok(None);
        };
        let unit = inner.units.get_mut(&work_id).expect("unit exists");
        unit.status = WorkUnitStatus::Assigned;
        unit.assigned_worker = Some(worker_id.to_string());
        unit.assigned_at = Some(now);
        unit.entries_processed = 0;
        let claimed = unit.clone();
        if let Some(worker) = inner.workers.get_mut(worker_id) {
            worker.state = WorkerState::Working;
            worker.current_work_id = Some(work_id);
            worker.last_heartbeat = now;
        }
        Ok(Some(claimed))
    }

    async fn active_unit_for(&self, worker_id: &str) -> Result<Option<WorkUnit>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .units
            .values()
            .find(|u| u.status.is_active() && u.assigned_worker.as_deref() == Some(worker_id))
            .cloned())
    }

    async fn update_progress(
        &self,
        work_id: &str,
        worker_id: &str,
        entries_processed: i64,
        rate: f64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let unit = inner
            .units
            .get_mut(work_id)
            .ok_or_else(|| Error::NotFound(format!("work unit {work_id}")))?;
        if unit.assigned_worker.as_deref() != Some(worker_id) || !unit.status.is_active() {
            return Err(Error::CoordinationConflict(format!(
                "{worker_id} does not own active unit {work_id}"
            )));
        }
        if unit.status == WorkUnitStatus::Assigned {
            unit.status = WorkUnitStatus::Processing;
            unit.started_at = Some(now);
        }
        if entries_processed < unit.entries_processed {
            debug!(
                work_id,
                reported = entries_processed,
                stored = unit.entries_processed,
                "ignoring progress regression"
            );
        }
        unit.entries_processed = unit.entries_processed.max(entries_processed);
        if let Some(worker) = inner.workers.get_mut(worker_id) {
            worker.last_heartbeat = now;
            worker.average_rate = rate;
            worker.state = WorkerState::Working;
        }
        Ok(())
    }

    async fn complete(
        &self,
        work_id: &str,
        worker_id: &str,
        final_count: i64,
        success: bool,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let unit = inner
            .units
            .get_mut(work_id)
            .ok_or_else(|| Error::NotFound(format!("work unit {work_id}")))?;
        if unit.assigned_worker.as_deref() != Some(worker_id) {
            return Err(Error::CoordinationConflict(format!(
                "{worker_id} does not own unit {work_id}"
            )));
        }
        if unit.status == WorkUnitStatus::Completed {
            if unit.entries_processed != final_count {
                warn!(
                    work_id,
                    stored = unit.entries_processed,
                    reported = final_count,
                    "repeated completion with different count, last writer wins"
                );
                unit.entries_processed = final_count;
            }
            return Ok(());
        }
        if !unit.status.is_active() {
            return Err(Error::CoordinationConflict(format!(
                "unit {work_id} is {} and cannot complete",
                unit.status.as_str()
            )));
        }
        unit.status = if success {
            WorkUnitStatus::Completed
        } else {
            WorkUnitStatus::Failed
        };
        unit.completed_at = Some(now);
        unit.entries_processed = final_count;
        if !success {
            unit.last_error = Some("reported_failure".into());
        }
        if let Some(worker) = inner.workers.get_mut(worker_id) {
            worker.state = WorkerState::Idle;
            worker.current_work_id = None;
            worker.total_processed += final_count;
            worker.last_heartbeat = now;
        }
        Ok(())
    }

    async fn register_worker(
        &self,
        worker_id: &str,
        ip: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner
            .workers
            .entry(worker_id.to_string())
            .and_modify(|w| {
                w.last_heartbeat = now;
                w.state = WorkerState::Idle;
                w.ip = ip.map(str::to_string).or_else(|| w.ip.clone());
            })
            .or_insert_with(|| WorkerRecord {
                worker_id: worker_id.to_string(),
                ip: ip.map(str::to_string),
                state: WorkerState::Idle,
                current_work_id: None,
                total_processed: 0,
                average_rate: 0.0,
                last_heartbeat: now,
                registered_at: now,
            });
        Ok(())
    }

    async fn heartbeat(
        &self,
        worker_id: &str,
        state: WorkerState,
        current_work_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner
            .workers
            .entry(worker_id.to_string())
            .and_modify(|w| {
                w.state = state;
                w.current_work_id = current_work_id.map(str::to_string);
                w.last_heartbeat = now;
            })
            .or_insert_with(|| WorkerRecord {
                worker_id: worker_id.to_string(),
                ip: None,
                state,
                current_work_id: current_work_id.map(str::to_string),
                total_processed: 0,
                average_rate: 0.0,
                last_heartbeat: now,
                registered_at: now,
            });
        Ok(())
    }

    async fn sweep_stale(
        &self,
        now: DateTime<Utc>,
        heartbeat_timeout: Duration,
        worker_ttl: Duration,
    ) -> Result<SweepOutcome> {
        let mut inner = self.inner.lock().await;
        let inner = &mut *inner;
        let cutoff = now - chrono::Duration::from_std(heartbeat_timeout).unwrap_or_default();
        let mut outcome = SweepOutcome::default();

        let mut stale: HashSet<String> = HashSet::new();
        for worker in inner.workers.values_mut() {
            if worker.last_heartbeat < cutoff {
                if worker.state != WorkerState::Offline {
                    worker.state = WorkerState::Offline;
                    worker.current_work_id = None;
                    outcome.offline_workers.push(worker.worker_id.clone());
                }
                stale.insert(worker.worker_id.clone());
            }
        }

        for unit in inner.units.values_mut() {
            if !unit.status.is_active() {
                continue;
            }
            let owner_stale = match unit.assigned_worker.as_deref() {
                Some(owner) => stale.contains(owner) || !inner.workers.contains_key(owner),
                None => true,
            };
            if !owner_stale {
                continue;
            }
            if unit.retry_count < unit.max_retries {
                unit.status = WorkUnitStatus::Pending;
                unit.assigned_worker = None;
                unit.assigned_at = None;
                unit.started_at = None;
                unit.entries_processed = 0;
                unit.retry_count += 1;
                unit.last_error = Some("worker_timeout".into());
                outcome.reassigned.push(unit.work_id.clone());
            } else {
                unit.status = WorkUnitStatus::Failed;
                unit.assigned_worker = None;
                unit.last_error = Some("worker_timeout".into());
                outcome.failed.push(unit.work_id.clone());
            }
        }

        let ttl_cutoff = now
            - chrono::Duration::from_std(heartbeat_timeout + worker_ttl).unwrap_or_default();
        inner
            .workers
            .retain(|_, w| w.state != WorkerState::Offline || w.last_heartbeat >= ttl_cutoff);

        Ok(outcome)
    }

    async fn list_units(&self) -> Result<Vec<WorkUnit>> {
        let inner = self.inner.lock().await;
        Ok(inner.units.values().cloned().collect())
    }

    async fn list_workers(&self) -> Result<Vec<WorkerRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner.workers.values().cloned().collect())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntryMeta;

    fn entry(aa: u8, qq: u8, ee: u8, a2: u8, label: &str) -> AqeaEntry {
        let now = Utc::now();
        AqeaEntry {
            address: AqeaAddress::new(aa, qq, ee, a2).unwrap(),
            label: label.into(),
            description: format!("German noun '{label}'."),
            domain: format!("0x{aa:02X}"),
            status: "active".into(),
            created_at: now,
            updated_at: now,
            lang_ui: "deu".into(),
            meta: EntryMeta {
                lemma: label.into(),
                pos: "noun".into(),
                language: "deu".into(),
                source: "test".into(),
                worker_id: "w1".into(),
                created_at: now,
                ..EntryMeta::default()
            },
            relations: Vec::new(),
        }
    }

    #[tokio::test]
    async fn upsert_is_idempotent_and_preserves_created_at() {
        let store = MemoryStore::new();
        let e = entry(0xA0, 0x01, 0x12, 0x01, "Apfel");
        let created = e.created_at;

        let stats = store.upsert_batch(&[e.clone()]).await.unwrap();
        assert_eq!(stats, UpsertStats { inserted: 1, updated: 0 });

        let mut again = e.clone();
        again.created_at = Utc::now();
        again.updated_at = Utc::now();
        let stats = store.upsert_batch(&[again]).await.unwrap();
        assert_eq!(stats, UpsertStats { inserted: 0, updated: 1 });

        let stored = store.get_entry(e.address).await.unwrap().unwrap();
        assert_eq!(stored.created_at, created);
    }

    #[tokio::test]
    async fn allocator_is_stable_and_exhausts() {
        let store = MemoryStore::new();
        let a2 = store.allocate(0xA0, 0x01, 0x12, "apfel", 0x10, "w1").await.unwrap();
        let again = store.allocate(0xA0, 0x01, 0x12, "apfel", 0x99, "w2").await.unwrap();
        assert_eq!(a2, again);

        for i in 0..253u32 {
            store
                .allocate(0xA1, 0x01, 0x12, &format!("word{i}"), 0x01, "w1")
                .await
                .unwrap();
        }
        store.allocate(0xA1, 0x01, 0x12, "word253", 0x01, "w1").await.unwrap();
        let err = store
            .allocate(0xA1, 0x01, 0x12, "one-too-many", 0x01, "w1")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AddressSpaceExhausted { .. }));
    }

    #[tokio::test]
    async fn claim_assigns_oldest_pending_once() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let units = vec![
            WorkUnit::new("wiktionary_deu_00".into(), "deu".into(), "wiktionary".into(), "A".into(), "E".into(), 10),
            WorkUnit::new("wiktionary_deu_01".into(), "deu".into(), "wiktionary".into(), "F".into(), "Z".into(), 10),
        ];
        store.create_work_units(&units).await.unwrap();

        let first = store.claim_next_pending("w1", now).await.unwrap().unwrap();
        assert_eq!(first.work_id, "wiktionary_deu_00");
        let second = store.claim_next_pending("w2", now).await.unwrap().unwrap();
        assert_eq!(second.work_id, "wiktionary_deu_01");
        assert!(store.claim_next_pending("w3", now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn progress_requires_ownership() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store
            .create_work_units(&[WorkUnit::new(
                "u1".into(), "deu".into(), "wiktionary".into(), "A".into(), "Z".into(), 10,
            )])
            .await
            .unwrap();
        store.register_worker("w1", None, now).await.unwrap();
        store.claim_next_pending("w1", now).await.unwrap().unwrap();

        let err = store.update_progress("u1", "w2", 5, 1.0, now).await.unwrap_err();
        assert!(matches!(err, Error::CoordinationConflict(_)));

        store.update_progress("u1", "w1", 5, 1.0, now).await.unwrap();
        // regressions are clamped, never stored
        store.update_progress("u1", "w1", 3, 1.0, now).await.unwrap();
        let unit = &store.list_units().await.unwrap()[0];
        assert_eq!(unit.entries_processed, 5);
        assert_eq!(unit.status, WorkUnitStatus::Processing);
    }

    #[tokio::test]
    async fn sweep_reassigns_then_fails() {
        let store = MemoryStore::new();
        let t0 = Utc::now();
        let mut unit = WorkUnit::new(
            "u1".into(), "deu".into(), "wiktionary".into(), "A".into(), "Z".into(), 10,
        );
        unit.max_retries = 1;
        store.create_work_units(&[unit]).await.unwrap();

        for round in 0..2 {
            store.register_worker("w1", None, t0).await.unwrap();
            store.claim_next_pending("w1", t0).await.unwrap().unwrap();
            let later = t0 + chrono::Duration::seconds(300);
            let outcome = store
                .sweep_stale(later, Duration::from_secs(120), Duration::from_secs(3600))
                .await
                .unwrap();
            if round == 0 {
                assert_eq!(outcome.reassigned, vec!["u1".to_string()]);
            } else {
                assert_eq!(outcome.failed, vec!["u1".to_string()]);
            }
        }
        let unit = &store.list_units().await.unwrap()[0];
        assert_eq!(unit.status, WorkUnitStatus::Failed);
        assert_eq!(unit.last_error.as_deref(), Some("worker_timeout"));
    }
}
