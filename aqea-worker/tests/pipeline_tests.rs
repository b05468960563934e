//! End-to-end pipeline scenarios
//!
//! Each test runs the real worker pipeline against a real master served on
//! an ephemeral port, with the mock extractor as the upstream. Coordination
//! state lives in a per-run store (as a master restart would give) while
//! the entry store persists across runs to exercise idempotent re-ingest.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{watch, RwLock};

use aqea_common::config::{AlphabetRange, LanguagePlan, MasterConfig, StoreConfig, WorkerConfig};
use aqea_common::model::{RawRecord, WorkUnitStatus};
use aqea_common::store::{AddressAllocator, CoordinationStore, EntryStore, MemoryStore, Store};
use aqea_master::{build_router, plan::build_work_units, AppState};
use aqea_worker::convert::AqeaConverter;
use aqea_worker::extractor::MockExtractor;
use aqea_worker::heartbeat::WorkerStatus;
use aqea_worker::master_client::MasterClient;
use aqea_worker::pipeline::WorkerPipeline;

fn master_config() -> MasterConfig {
    MasterConfig {
        bind_addr: "127.0.0.1:0".into(),
        source: "mock".into(),
        plan: LanguagePlan {
            language_code: "deu".into(),
            estimated_entries: 10,
            alphabet_ranges: vec![AlphabetRange {
                start: "A".into(),
                end: "E".into(),
                weight: 1.0,
            }],
        },
        heartbeat_timeout_secs: 120,
        sweep_interval_secs: 30,
        worker_ttl_secs: 3600,
        max_retries: 3,
        store: StoreConfig::default(),
    }
}

fn worker_config(master_url: &str, fallback_dir: &std::path::Path) -> WorkerConfig {
    WorkerConfig {
        master_url: master_url.to_string(),
        worker_id: Some("w1".into()),
        batch_size: 2,
        flush_interval_secs: 1,
        request_delay_ms: 0,
        max_concurrent_requests: 2,
        upstream_timeout_secs: 5,
        fallback_dir: fallback_dir.to_path_buf(),
        store: StoreConfig::default(),
    }
}

/// Serve a master over the given coordination store; returns its base URL.
async fn start_master(coord_store: Arc<dyn Store>) -> String {
    let config = master_config();
    let units = build_work_units(&config.plan, &config.source, config.max_retries);
    let total = units.iter().map(|u| u.estimated_entries).sum();
    coord_store.create_work_units(&units).await.unwrap();
    let state = AppState::new(coord_store, &config, total);
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn noun(word: &str, definition: &str) -> RawRecord {
    RawRecord {
        word: word.into(),
        language: "deu".into(),
        pos: Some("noun".into()),
        definitions: vec![definition.into()],
        ..RawRecord::default()
    }
}

fn german_nouns() -> Vec<RawRecord> {
    vec![
        noun("Apfel", "rundliche Frucht des Apfelbaums"),
        noun("Auto", "Kraftfahrzeug zur Personenbeförderung"),
        noun("Brot", "aus Mehl gebackenes Nahrungsmittel"),
        noun("Dach", "oberer Abschluss eines Gebäudes"),
        noun("Ende", "Stelle, an der etwas aufhört"),
    ]
}

struct Run {
    pipeline: WorkerPipeline,
    client: MasterClient,
    shutdown_rx: watch::Receiver<bool>,
    _shutdown_tx: watch::Sender<bool>,
}

async fn setup_run(
    coord_store: Arc<dyn Store>,
    entry_store: Arc<dyn Store>,
    worker_id: &str,
    fallback_dir: &std::path::Path,
) -> Run {
    let base_url = start_master(coord_store).await;
    let client = MasterClient::new(&base_url).unwrap();
    let registered = client.register(Some(worker_id)).await.unwrap();
    assert_eq!(registered.worker_id, worker_id);

    let mut config = worker_config(&base_url, fallback_dir);
    config.worker_id = Some(worker_id.to_string());
    let pipeline = WorkerPipeline::new(
        worker_id.to_string(),
        config,
        entry_store,
        client.clone(),
        Arc::new(RwLock::new(WorkerStatus::default())),
    );
    let (tx, rx) = watch::channel(false);
    Run {
        pipeline,
        client,
        shutdown_rx: rx,
        _shutdown_tx: tx,
    }
}

#[tokio::test]
async fn s1_happy_path_single_unit() {
    let coord_store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let entry_store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let dir = tempfile::tempdir().unwrap();
    let mut run = setup_run(coord_store.clone(), entry_store.clone(), "w1", dir.path()).await;

    let work = run.client.request_work("w1").await.unwrap().unwrap();
    assert_eq!(work.work_id, "mock_deu_00");

    let extractor = Arc::new(MockExtractor::new(german_nouns()));
    let outcome = run
        .pipeline
        .process_unit(extractor, &work, &mut run.shutdown_rx)
        .await
        .unwrap();
    assert_eq!(outcome.processed, 5);
    assert_eq!(outcome.soft_errors, 0);

    let entries = entry_store
        .query_entries(&"0xA0:01:*:*".parse().unwrap())
        .await
        .unwrap();
    assert_eq!(entries.len(), 5, "all five nouns land under 0xA0:01");
    let mut addresses: Vec<_> = entries.iter().map(|e| e.address).collect();
    addresses.sort();
    addresses.dedup();
    assert_eq!(addresses.len(), 5, "addresses are unique");

    let units = coord_store.list_units().await.unwrap();
    assert_eq!(units[0].status, WorkUnitStatus::Completed);
    assert_eq!(units[0].entries_processed, 5);
}

#[tokio::test]
async fn s2_worker_failure_and_reassignment() {
    let coord_store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let entry_store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let dir = tempfile::tempdir().unwrap();

    // W1 claims the unit, flushes three entries, then goes silent.
    let run1 = setup_run(coord_store.clone(), entry_store.clone(), "w1", dir.path()).await;
    let work = run1.client.request_work("w1").await.unwrap().unwrap();
    let converter = AqeaConverter::new(
        "deu",
        "mock",
        "w1",
        Arc::new(aqea_common::store::AllocatorHandle(entry_store.clone())),
    )
    .unwrap();
    let mut flushed = Vec::new();
    for record in &german_nouns()[..3] {
        flushed.push(converter.convert(record).await.unwrap());
    }
    entry_store.upsert_batch(&flushed).await.unwrap();
    run1.client
        .report_progress(&work.work_id, "w1", 3, 30.0, Vec::new(), false)
        .await
        .unwrap();

    // Heartbeat timeout elapses; the sweep returns the unit to pending.
    let later = Utc::now() + chrono::Duration::seconds(300);
    let outcome = coord_store
        .sweep_stale(later, Duration::from_secs(120), Duration::from_secs(3600))
        .await
        .unwrap();
    assert_eq!(outcome.reassigned, vec![work.work_id.clone()]);

    // W2 claims the same unit and processes the whole range from scratch.
    let mut run2 = setup_run(coord_store.clone(), entry_store.clone(), "w2", dir.path()).await;
    let rework = run2.client.request_work("w2").await.unwrap().unwrap();
    assert_eq!(rework.work_id, work.work_id);

    let extractor = Arc::new(MockExtractor::new(german_nouns()));
    let outcome = run2
        .pipeline
        .process_unit(extractor, &rework, &mut run2.shutdown_rx)
        .await
        .unwrap();
    assert_eq!(outcome.processed, 5);

    let units = coord_store.list_units().await.unwrap();
    assert_eq!(units[0].status, WorkUnitStatus::Completed);
    assert_eq!(units[0].entries_processed, 5);
    assert_eq!(units[0].retry_count, 1);

    // idempotent upsert: W1's three flushed entries did not duplicate
    let entries = entry_store
        .query_entries(&"0xA0:*:*:*".parse().unwrap())
        .await
        .unwrap();
    assert_eq!(entries.len(), 5);
}

#[tokio::test]
async fn s4_address_exhaustion_is_a_soft_error() {
    let coord_store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let entry_store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let dir = tempfile::tempdir().unwrap();

    // Find the tuple the first record will land in, then fill it up.
    let probe_store = Arc::new(MemoryStore::new());
    let probe = AqeaConverter::new("deu", "mock", "probe", probe_store)
        .unwrap()
        .convert(&noun("Apfel", "rundliche Frucht des Apfelbaums"))
        .await
        .unwrap();
    let (aa, qq, ee) = (probe.address.aa(), probe.address.qq(), probe.address.ee());
    for i in 0..254u32 {
        entry_store
            .allocate(aa, qq, ee, &format!("filler-{i}"), 0x01, "setup")
            .await
            .unwrap();
    }

    let mut run = setup_run(coord_store.clone(), entry_store.clone(), "w1", dir.path()).await;
    let work = run.client.request_work("w1").await.unwrap().unwrap();
    let extractor = Arc::new(MockExtractor::new(vec![
        noun("Apfel", "rundliche Frucht des Apfelbaums"),
        noun("Brot", "aus Mehl gebackenes Nahrungsmittel"),
    ]));
    let outcome = run
        .pipeline
        .process_unit(extractor, &work, &mut run.shutdown_rx)
        .await
        .unwrap();

    // the exhausted record is skipped, the run continues and completes
    assert_eq!(outcome.processed, 2);
    assert_eq!(outcome.soft_errors, 1);
    let units = coord_store.list_units().await.unwrap();
    assert_eq!(units[0].status, WorkUnitStatus::Completed);

    let entries = entry_store
        .query_entries(&"0xA0:*:*:*".parse().unwrap())
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].label, "Brot");
}

#[tokio::test]
async fn s5_idempotent_reingest() {
    let entry_store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let dir = tempfile::tempdir().unwrap();

    let mut first_addresses = Vec::new();
    let mut first_created = Vec::new();

    for round in 0..2 {
        // fresh coordination per run, persistent entry store
        let coord_store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let mut run = setup_run(coord_store.clone(), entry_store.clone(), "w1", dir.path()).await;
        let work = run.client.request_work("w1").await.unwrap().unwrap();
        let extractor = Arc::new(MockExtractor::new(german_nouns()));
        let outcome = run
            .pipeline
            .process_unit(extractor, &work, &mut run.shutdown_rx)
            .await
            .unwrap();
        assert_eq!(outcome.processed, 5);

        let mut entries = entry_store
            .query_entries(&"0xA0:*:*:*".parse().unwrap())
            .await
            .unwrap();
        entries.sort_by_key(|e| e.address);
        assert_eq!(entries.len(), 5, "re-ingest never duplicates");

        if round == 0 {
            first_addresses = entries.iter().map(|e| e.address).collect();
            first_created = entries.iter().map(|e| e.created_at).collect();
        } else {
            let addresses: Vec<_> = entries.iter().map(|e| e.address).collect();
            assert_eq!(addresses, first_addresses, "allocator returned the same A2s");
            for (entry, created) in entries.iter().zip(&first_created) {
                assert_eq!(entry.created_at, *created, "created_at survives re-ingest");
                assert!(entry.updated_at > *created, "updated_at is bumped");
            }
        }
    }

    // no extra element IDs were consumed by the second run
    let stats = entry_store.allocation_stats().await.unwrap();
    assert_eq!(stats.total_allocated, 5);
}

#[tokio::test]
async fn shutdown_flushes_and_aborts_without_completing() {
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use aqea_worker::extractor::{ExtractorEvent, SourceExtractor};

    /// Sends one record, then stalls until cancelled.
    struct StallingExtractor;

    #[async_trait]
    impl SourceExtractor for StallingExtractor {
        fn name(&self) -> &'static str {
            "stalling"
        }

        async fn extract_range(
            &self,
            _language: &str,
            _range_start: &str,
            _range_end: &str,
            tx: mpsc::Sender<ExtractorEvent>,
        ) -> aqea_common::Result<()> {
            let record = RawRecord {
                word: "Apfel".into(),
                language: "deu".into(),
                pos: Some("noun".into()),
                definitions: vec!["rundliche Frucht".into()],
                ..RawRecord::default()
            };
            let _ = tx.send(ExtractorEvent::Record(record)).await;
            tokio::time::sleep(Duration::from_secs(600)).await;
            Ok(())
        }
    }

    let coord_store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let entry_store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let dir = tempfile::tempdir().unwrap();
    let mut run = setup_run(coord_store.clone(), entry_store.clone(), "w1", dir.path()).await;
    let work = run.client.request_work("w1").await.unwrap().unwrap();

    let shutdown_tx = run._shutdown_tx;
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        let _ = shutdown_tx.send(true);
    });

    let outcome = run
        .pipeline
        .process_unit(Arc::new(StallingExtractor), &work, &mut run.shutdown_rx)
        .await
        .unwrap();
    assert!(outcome.aborted);
    assert_eq!(outcome.processed, 1);

    // the pending batch was flushed before aborting
    let entries = entry_store
        .query_entries(&"0xA0:*:*:*".parse().unwrap())
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);

    // no completion was sent; the unit stays active until the sweep acts
    let units = coord_store.list_units().await.unwrap();
    assert!(units[0].status.is_active());
}
