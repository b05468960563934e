//! Central SQL backend (Postgres / Supabase)
//!
//! Preferred for multi-host deployments: claims rely on
//! `FOR UPDATE SKIP LOCKED` and allocation on server-side unique
//! constraints, so any number of workers can share it. Row shapes and
//! timestamp encoding match the SQLite backend (RFC 3339 TEXT).

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::Row;
use tracing::{info, warn};

use crate::address::{AddressPattern, AqeaAddress, A2_MAX, A2_MIN};
use crate::model::{AqeaEntry, EntryMeta, Relation, WorkUnit, WorkUnitStatus, WorkerRecord, WorkerState};
use crate::time::{parse_rfc3339, to_rfc3339};
use crate::{Error, Result};

use super::{
    merge_meta, AddressAllocator, AllocationStats, CoordinationStore, EntryStore, SweepOutcome,
    UpsertStats,
};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPool::connect(url).await?;
        let store = Self { pool };
        store.create_schema().await?;
        info!("postgres store ready");
        Ok(store)
    }

    async fn create_schema(&self) -> Result<()> {
        for ddl in [
            r#"
            CREATE TABLE IF NOT EXISTS aqea_entries (
                address TEXT PRIMARY KEY,
                label TEXT NOT NULL,
                description TEXT NOT NULL,
                domain TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                lang_ui TEXT NOT NULL,
                meta TEXT NOT NULL,
                relations TEXT NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_aqea_entries_domain ON aqea_entries(domain)",
            r#"
            CREATE TABLE IF NOT EXISTS work_units (
                work_id TEXT PRIMARY KEY,
                language TEXT NOT NULL,
                source TEXT NOT NULL,
                range_start TEXT NOT NULL,
                range_end TEXT NOT NULL,
                status TEXT NOT NULL,
                assigned_worker TEXT,
                assigned_at TEXT,
                started_at TEXT,
                completed_at TEXT,
                entries_processed BIGINT NOT NULL DEFAULT 0,
                estimated_entries BIGINT NOT NULL,
                retry_count INTEGER NOT NULL DEFAULT 0,
                max_retries INTEGER NOT NULL DEFAULT 3,
                last_error TEXT
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_work_units_status ON work_units(status)",
            r#"
            CREATE TABLE IF NOT EXISTS worker_status (
                worker_id TEXT PRIMARY KEY,
                ip TEXT,
                status TEXT NOT NULL,
                current_work_id TEXT,
                total_processed BIGINT NOT NULL DEFAULT 0,
                average_rate DOUBLE PRECISION NOT NULL DEFAULT 0,
                last_heartbeat TEXT NOT NULL,
                registered_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS address_allocations (
                aa SMALLINT NOT NULL,
                qq SMALLINT NOT NULL,
                ee SMALLINT NOT NULL,
                lemma_key TEXT NOT NULL,
                a2 SMALLINT NOT NULL,
                allocated_at TEXT NOT NULL,
                allocated_by TEXT NOT NULL,
                UNIQUE (aa, qq, ee, lemma_key),
                UNIQUE (aa, qq, ee, a2)
            )
            "#,
        ] {
            sqlx::query(ddl).execute(&self.pool).await?;
        }
        Ok(())
    }
}

const UNIT_COLUMNS: &str = "work_id, language, source, range_start, range_end, status, \
     assigned_worker, assigned_at, started_at, completed_at, entries_processed, \
     estimated_entries, retry_count, max_retries, last_error";

#[derive(sqlx::FromRow)]
struct UnitRow {
    work_id: String,
    language: String,
    source: String,
    range_start: String,
    range_end: String,
    status: String,
    assigned_worker: Option<String>,
    assigned_at: Option<String>,
    started_at: Option<String>,
    completed_at: Option<String>,
    entries_processed: i64,
    estimated_entries: i64,
    retry_count: i32,
    max_retries: i32,
    last_error: Option<String>,
}

impl UnitRow {
    fn try_into_unit(self) -> Result<WorkUnit> {
        Ok(WorkUnit {
            work_id: self.work_id,
            language: self.language,
            source: self.source,
            range_start: self.range_start,
            range_end: self.range_end,
            status: WorkUnitStatus::parse(&self.status)?,
            assigned_worker: self.assigned_worker,
            assigned_at: self.assigned_at.as_deref().map(parse_rfc3339).transpose()?,
            started_at: self.started_at.as_deref().map(parse_rfc3339).transpose()?,
            completed_at: self.completed_at.as_deref().map(parse_rfc3339).transpose()?,
            entries_processed: self.entries_processed,
            estimated_entries: self.estimated_entries,
            retry_count: self.retry_count,
            max_retries: self.max_retries,
            last_error: self.last_error,
        })
    }
}

#[derive(sqlx::FromRow)]
struct EntryRow {
    address: String,
    label: String,
    description: String,
    domain: String,
    status: String,
    created_at: String,
    updated_at: String,
    lang_ui: String,
    meta: String,
    relations: String,
}

impl EntryRow {
    fn try_into_entry(self) -> Result<AqeaEntry> {
        Ok(AqeaEntry {
            address: self.address.parse()?,
            label: self.label,
            description: self.description,
            domain: self.domain,
            status: self.status,
            created_at: parse_rfc3339(&self.created_at)?,
            updated_at: parse_rfc3339(&self.updated_at)?,
            lang_ui: self.lang_ui,
            meta: serde_json::from_str::<EntryMeta>(&self.meta)?,
            relations: serde_json::from_str::<Vec<Relation>>(&self.relations)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct WorkerRow {
    worker_id: String,
    ip: Option<String>,
    status: String,
    current_work_id: Option<String>,
    total_processed: i64,
    average_rate: f64,
    last_heartbeat: String,
    registered_at: String,
}

impl WorkerRow {
    fn try_into_record(self) -> Result<WorkerRecord> {
        Ok(WorkerRecord {
            worker_id: self.worker_id,
            ip: self.ip,
            state: WorkerState::parse(&self.status)?,
            current_work_id: self.current_work_id,
            total_processed: self.total_processed,
            average_rate: self.average_rate,
            last_heartbeat: parse_rfc3339(&self.last_heartbeat)?,
            registered_at: parse_rfc3339(&self.registered_at)?,
        })
    }
}

fn pattern_like_prefix(pattern: &AddressPattern) -> Option<String> {
    let fixed = pattern.fixed_prefix();
    if fixed.is_empty() {
        return None;
    }
    let mut prefix = format!("0x{:02X}", fixed[0]);
    for byte in &fixed[1..] {
        prefix.push_str(&format!(":{byte:02X}"));
    }
    prefix.push(':');
    if fixed.len() == 4 {
        prefix.pop();
    }
    Some(prefix)
}

#[async_trait]
impl EntryStore for PgStore {
    async fn upsert_batch(&self, entries: &[AqeaEntry]) -> Result<UpsertStats> {
        let mut tx = self.pool.begin().await?;
        let mut stats = UpsertStats::default();
        for entry in entries {
            entry.validate()?;
            let address = entry.address.to_string();
            let existing: Option<(String,)> =
                sqlx::query_as("SELECT meta FROM aqea_entries WHERE address = $1 FOR UPDATE")
                    .bind(&address)
                    .fetch_optional(&mut *tx)
                    .await?;
            match existing {
                Some((stored_meta,)) => {
                    let merged = merge_meta(
                        &serde_json::from_str(&stored_meta)?,
                        &serde_json::to_value(&entry.meta)?,
                    );
                    sqlx::query(
                        "UPDATE aqea_entries SET label = $1, description = $2, domain = $3, \
                         status = $4, updated_at = $5, lang_ui = $6, meta = $7, relations = $8 \
                         WHERE address = $9",
                    )
                    .bind(&entry.label)
                    .bind(&entry.description)
                    .bind(&entry.domain)
                    .bind(&entry.status)
                    .bind(to_rfc3339(entry.updated_at))
                    .bind(&entry.lang_ui)
                    .bind(serde_json::to_string(&merged)?)
                    .bind(serde_json::to_string(&entry.relations)?)
                    .bind(&address)
                    .execute(&mut *tx)
                    .await?;
                    stats.updated += 1;
                }
                None => {
                    sqlx::query(
                        "INSERT INTO aqea_entries \
                         (address, label, description, domain, status, created_at, updated_at, \
                          lang_ui, meta, relations) \
                         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
                    )
                    .bind(&address)
                    .bind(&entry.label)
                    .bind(&entry.description)
                    .bind(&entry.domain)
                    .bind(&entry.status)
                    .bind(to_rfc3339(entry.created_at))
                    .bind(to_rfc3339(entry.updated_at))
                    .bind(&entry.lang_ui)
                    .bind(serde_json::to_string(&entry.meta)?)
                    .bind(serde_json::to_string(&entry.relations)?)
                    .execute(&mut *tx)
                    .await?;
                    stats.inserted += 1;
                }
            }
        }
        tx.commit().await?;
        Ok(stats)
    }

    async fn get_entry(&self, address: AqeaAddress) -> Result<Option<AqeaEntry>> {
        let row: Option<EntryRow> =
            sqlx::query_as("SELECT * FROM aqea_entries WHERE address = $1")
                .bind(address.to_string())
                .fetch_optional(&self.pool)
                .await?;
        row.map(EntryRow::try_into_entry).transpose()
    }

    async fn query_entries(&self, pattern: &AddressPattern) -> Result<Vec<AqeaEntry>> {
        let rows: Vec<EntryRow> = match pattern_like_prefix(pattern) {
            Some(prefix) => {
                sqlx::query_as(
                    "SELECT * FROM aqea_entries WHERE address LIKE $1 || '%' ORDER BY address",
                )
                .bind(prefix)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as("SELECT * FROM aqea_entries ORDER BY address")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.into_iter().map(EntryRow::try_into_entry).collect()
    }
}

#[async_trait]
impl AddressAllocator for PgStore {
    async fn allocate(
        &self,
        aa: u8,
        qq: u8,
        ee: u8,
        lemma_key: &str,
        preferred: u8,
        allocated_by: &str,
    ) -> Result<u8> {
        for _attempt in 0..5 {
            let mut tx = self.pool.begin().await?;
            let hit: Option<(i16,)> = sqlx::query_as(
                "SELECT a2 FROM address_allocations \
                 WHERE aa = $1 AND qq = $2 AND ee = $3 AND lemma_key = $4",
            )
            .bind(aa as i16)
            .bind(qq as i16)
            .bind(ee as i16)
            .bind(lemma_key)
            .fetch_optional(&mut *tx)
            .await?;
            if let Some((a2,)) = hit {
                return Ok(a2 as u8);
            }

            let taken: Vec<(i16,)> = sqlx::query_as(
                "SELECT a2 FROM address_allocations WHERE aa = $1 AND qq = $2 AND ee = $3",
            )
            .bind(aa as i16)
            .bind(qq as i16)
            .bind(ee as i16)
            .fetch_all(&mut *tx)
            .await?;
            let used: HashSet<u8> = taken.iter().map(|(a2,)| *a2 as u8).collect();
            if used.len() >= (A2_MAX - A2_MIN + 1) as usize {
                return Err(Error::AddressSpaceExhausted { aa, qq, ee });
            }
            let mut candidate = preferred.clamp(A2_MIN, A2_MAX);
            while used.contains(&candidate) {
                candidate = if candidate == A2_MAX { A2_MIN } else { candidate + 1 };
            }

            let inserted = sqlx::query(
                "INSERT INTO address_allocations \
                 (aa, qq, ee, lemma_key, a2, allocated_at, allocated_by) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(aa as i16)
            .bind(qq as i16)
            .bind(ee as i16)
            .bind(lemma_key)
            .bind(candidate as i16)
            .bind(to_rfc3339(Utc::now()))
            .bind(allocated_by)
            .execute(&mut *tx)
            .await;
            match inserted {
                Ok(_) => {
                    tx.commit().await?;
                    return Ok(candidate);
                }
                Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                    tx.rollback().await?;
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(Error::StoreTransient(format!(
            "allocation for 0x{aa:02X}:{qq:02X}:{ee:02X} kept losing races"
        )))
    }

    async fn allocation_stats(&self) -> Result<AllocationStats> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total, COUNT(DISTINCT (aa, qq, ee)) AS tuples \
             FROM address_allocations",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(AllocationStats {
            total_allocated: row.get::<i64, _>("total") as u64,
            tuples_used: row.get::<i64, _>("tuples") as u64,
        })
    }
}

#[async_trait]
impl CoordinationStore for PgStore {
    async fn create_work_units(&self, units: &[WorkUnit]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for unit in units {
            sqlx::query(
                "INSERT INTO work_units \
                 (work_id, language, source, range_start, range_end, status, \
                  entries_processed, estimated_entries, retry_count, max_retries) \
                 VALUES ($1, $2, $3, $4, $5, $6, 0, $7, 0, $8) \
                 ON CONFLICT (work_id) DO NOTHING",
            )
            .bind(&unit.work_id)
            .bind(&unit.language)
            .bind(&unit.source)
            .bind(&unit.range_start)
            .bind(&unit.range_end)
            .bind(unit.status.as_str())
            .bind(unit.estimated_entries)
            .bind(unit.max_retries)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn claim_next_pending(
        &self,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<WorkUnit>> {
        let mut tx = self.pool.begin().await?;
        let row: Option<UnitRow> = sqlx::query_as(&format!(
            "UPDATE work_units \
             SET status = 'assigned', assigned_worker = $1, assigned_at = $2, \
                 entries_processed = 0 \
             WHERE work_id = ( \
                 SELECT work_id FROM work_units WHERE status = 'pending' \
                 ORDER BY work_id LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {UNIT_COLUMNS}"
        ))
        .bind(worker_id)
        .bind(to_rfc3339(now))
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.commit().await?;
            return Ok(None);
        };
        let unit = row.try_into_unit()?;
        sqlx::query(
            "UPDATE worker_status SET status = 'working', current_work_id = $1, \
             last_heartbeat = $2 WHERE worker_id = $3",
        )
        .bind(&unit.work_id)
        .bind(to_rfc3339(now))
        .bind(worker_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(Some(unit))
    }

    async fn active_unit_for(&self, worker_id: &str) -> Result<Option<WorkUnit>> {
        let row: Option<UnitRow> = sqlx::query_as(&format!(
            "SELECT {UNIT_COLUMNS} FROM work_units \
             WHERE assigned_worker = $1 AND status IN ('assigned', 'processing')"
        ))
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(UnitRow::try_into_unit).transpose()
    }

    async fn update_progress(
        &self,
        work_id: &str,
        worker_id: &str,
        entries_processed: i64,
        rate: f64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let row: Option<(String, Option<String>)> = sqlx::query_as(
            "SELECT status, assigned_worker FROM work_units WHERE work_id = $1 FOR UPDATE",
        )
        .bind(work_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some((status, owner)) = row else {
            return Err(Error::NotFound(format!("work unit {work_id}")));
        };
        let status = WorkUnitStatus::parse(&status)?;
        if owner.as_deref() != Some(worker_id) || !status.is_active() {
            return Err(Error::CoordinationConflict(format!(
                "{worker_id} does not own active unit {work_id}"
            )));
        }
        sqlx::query(
            "UPDATE work_units SET status = 'processing', \
             started_at = COALESCE(started_at, $1), \
             entries_processed = GREATEST(entries_processed, $2) \
             WHERE work_id = $3",
        )
        .bind(to_rfc3339(now))
        .bind(entries_processed)
        .bind(work_id)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "UPDATE worker_status SET last_heartbeat = $1, average_rate = $2, \
             status = 'working' WHERE worker_id = $3",
        )
        .bind(to_rfc3339(now))
        .bind(rate)
        .bind(worker_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
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
        let mut tx = self.pool.begin().await?;
        let row: Option<(String, Option<String>, i64)> = sqlx::query_as(
            "SELECT status, assigned_worker, entries_processed FROM work_units \
             WHERE work_id = $1 FOR UPDATE",
        )
        .bind(work_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some((status, owner, stored_count)) = row else {
            return Err(Error::NotFound(format!("work unit {work_id}")));
        };
        let status = WorkUnitStatus::parse(&status)?;
        if owner.as_deref() != Some(worker_id) {
            return Err(Error::CoordinationConflict(format!(
                "{worker_id} does not own unit {work_id}"
            )));
        }
        if status == WorkUnitStatus::Completed {
            if stored_count != final_count {
                warn!(
                    work_id,
                    stored = stored_count,
                    reported = final_count,
                    "repeated completion with different count, last writer wins"
                );
                sqlx::query("UPDATE work_units SET entries_processed = $1 WHERE work_id = $2")
                    .bind(final_count)
                    .bind(work_id)
                    .execute(&mut *tx)
                    .await?;
                tx.commit().await?;
            }
            return Ok(());
        }
        if !status.is_active() {
            return Err(Error::CoordinationConflict(format!(
                "unit {work_id} is {} and cannot complete",
                status.as_str()
            )));
        }
        let new_status = if success { "completed" } else { "failed" };
        sqlx::query(
            "UPDATE work_units SET status = $1, completed_at = $2, entries_processed = $3, \
             last_error = CASE WHEN $4 THEN last_error ELSE 'reported_failure' END \
             WHERE work_id = $5",
        )
        .bind(new_status)
        .bind(to_rfc3339(now))
        .bind(final_count)
        .bind(success)
        .bind(work_id)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "UPDATE worker_status SET status = 'idle', current_work_id = NULL, \
             total_processed = total_processed + $1, last_heartbeat = $2 WHERE worker_id = $3",
        )
        .bind(final_count)
        .bind(to_rfc3339(now))
        .bind(worker_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn register_worker(
        &self,
        worker_id: &str,
        ip: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO worker_status \
             (worker_id, ip, status, total_processed, average_rate, last_heartbeat, registered_at) \
             VALUES ($1, $2, 'idle', 0, 0, $3, $3) \
             ON CONFLICT (worker_id) DO UPDATE SET \
                 status = 'idle', last_heartbeat = excluded.last_heartbeat, \
                 ip = COALESCE(excluded.ip, worker_status.ip)",
        )
        .bind(worker_id)
        .bind(ip)
        .bind(to_rfc3339(now))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn heartbeat(
        &self,
        worker_id: &str,
        state: WorkerState,
        current_work_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO worker_status \
             (worker_id, status, current_work_id, total_processed, average_rate, \
              last_heartbeat, registered_at) \
             VALUES ($1, $2, $3, 0, 0, $4, $4) \
             ON CONFLICT (worker_id) DO UPDATE SET \
                 status = excluded.status, current_work_id = excluded.current_work_id, \
                 last_heartbeat = excluded.last_heartbeat",
        )
        .bind(worker_id)
        .bind(state.as_str())
        .bind(current_work_id)
        .bind(to_rfc3339(now))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn sweep_stale(
        &self,
        now: DateTime<Utc>,
        heartbeat_timeout: Duration,
        worker_ttl: Duration,
    ) -> Result<SweepOutcome> {
        let cutoff = to_rfc3339(
            now - chrono::Duration::from_std(heartbeat_timeout).unwrap_or_default(),
        );
        let mut tx = self.pool.begin().await?;
        let mut outcome = SweepOutcome::default();

        let newly_offline: Vec<(String,)> = sqlx::query_as(
            "UPDATE worker_status SET status = 'offline', current_work_id = NULL \
             WHERE last_heartbeat < $1 AND status != 'offline' \
             RETURNING worker_id",
        )
        .bind(&cutoff)
        .fetch_all(&mut *tx)
        .await?;
        outcome.offline_workers = newly_offline.into_iter().map(|(id,)| id).collect();

        let orphaned: Vec<UnitRow> = sqlx::query_as(&format!(
            "SELECT {UNIT_COLUMNS} FROM work_units u \
             WHERE u.status IN ('assigned', 'processing') AND ( \
                 u.assigned_worker IS NULL OR NOT EXISTS ( \
                     SELECT 1 FROM worker_status w \
                     WHERE w.worker_id = u.assigned_worker AND w.last_heartbeat >= $1 \
                 )) \
             FOR UPDATE"
        ))
        .bind(&cutoff)
        .fetch_all(&mut *tx)
        .await?;

        for row in orphaned {
            let unit = row.try_into_unit()?;
            if unit.retry_count < unit.max_retries {
                sqlx::query(
                    "UPDATE work_units SET status = 'pending', assigned_worker = NULL, \
                     assigned_at = NULL, started_at = NULL, entries_processed = 0, \
                     retry_count = retry_count + 1, last_error = 'worker_timeout' \
                     WHERE work_id = $1",
                )
                .bind(&unit.work_id)
                .execute(&mut *tx)
                .await?;
                outcome.reassigned.push(unit.work_id);
            } else {
                sqlx::query(
                    "UPDATE work_units SET status = 'failed', assigned_worker = NULL, \
                     last_error = 'worker_timeout' WHERE work_id = $1",
                )
                .bind(&unit.work_id)
                .execute(&mut *tx)
                .await?;
                outcome.failed.push(unit.work_id);
            }
        }

        let ttl_cutoff = to_rfc3339(
            now - chrono::Duration::from_std(heartbeat_timeout + worker_ttl).unwrap_or_default(),
        );
        sqlx::query("DELETE FROM worker_status WHERE status = 'offline' AND last_heartbeat < $1")
            .bind(&ttl_cutoff)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(outcome)
    }

    async fn list_units(&self) -> Result<Vec<WorkUnit>> {
        let rows: Vec<UnitRow> = sqlx::query_as(&format!(
            "SELECT {UNIT_COLUMNS} FROM work_units ORDER BY work_id"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(UnitRow::try_into_unit).collect()
    }

    async fn list_workers(&self) -> Result<Vec<WorkerRecord>> {
        let rows: Vec<WorkerRow> =
            sqlx::query_as("SELECT * FROM worker_status ORDER BY worker_id")
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(WorkerRow::try_into_record).collect()
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
