//! Worker pipeline
//!
//! Drives one claimed unit at a time: stream records from the extractor,
//! convert, accumulate into a batch, flush to the store, report progress.
//! Flushes happen on batch-size or on the flush interval, whichever comes
//! first. Store trouble triggers backpressure (smaller batches, longer
//! inter-batch delay) and, past the retry budget, the NDJSON fallback.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::time::{interval, sleep, Instant};
use tracing::{debug, info, warn};

use aqea_common::api::{WorkError, WorkResponse};
use aqea_common::config::WorkerConfig;
use aqea_common::model::{AqeaEntry, WorkerState};
use aqea_common::store::{with_backoff, AllocatorHandle, EntryStore, Store};
use aqea_common::{Error, Result};

use crate::convert::AqeaConverter;
use crate::extractor::{create_extractor, ExtractorEvent, SourceExtractor};
use crate::fallback::write_fallback_batch;
use crate::heartbeat::WorkerStatus;
use crate::master_client::MasterClient;

/// Batch size floor under backpressure.
const MIN_BATCH_SIZE: usize = 10;
/// Inter-batch delay ceiling under backpressure.
const MAX_INTER_BATCH_DELAY: Duration = Duration::from_secs(10);
/// EWMA smoothing factor for the per-minute rate.
const RATE_ALPHA: f64 = 0.3;
/// Idle poll backoff bounds (jittered).
const IDLE_SLEEP_MIN_MS: u64 = 2_000;
const IDLE_SLEEP_MAX_MS: u64 = 10_000;

/// What one unit run produced.
#[derive(Debug, Default)]
pub struct UnitOutcome {
    pub processed: i64,
    pub soft_errors: u64,
    pub aborted: bool,
}

pub struct WorkerPipeline {
    worker_id: String,
    config: WorkerConfig,
    store: Arc<dyn Store>,
    client: MasterClient,
    status: Arc<RwLock<WorkerStatus>>,
}

impl WorkerPipeline {
    pub fn new(
        worker_id: String,
        config: WorkerConfig,
        store: Arc<dyn Store>,
        client: MasterClient,
        status: Arc<RwLock<WorkerStatus>>,
    ) -> Self {
        Self {
            worker_id,
            config,
            store,
            client,
            status,
        }
    }

    /// Main loop: poll for work until shutdown. Hard errors (unsupported
    /// language, unknown source) propagate; everything else is logged and
    /// the loop keeps polling.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        loop {
            if *shutdown.borrow() {
                return Ok(());
            }
            match self.client.request_work(&self.worker_id).await {
                Ok(Some(work)) => {
                    self.set_status(WorkerState::Working, Some(work.work_id.clone()))
                        .await;
                    let result = self.run_unit(&work, &mut shutdown).await;
                    self.set_status(WorkerState::Idle, None).await;
                    match result {
                        Ok(outcome) if outcome.aborted => return Ok(()),
                        Ok(outcome) => info!(
                            work_id = %work.work_id,
                            processed = outcome.processed,
                            soft_errors = outcome.soft_errors,
                            "unit finished"
                        ),
                        Err(Error::CoordinationConflict(msg)) => {
                            warn!(work_id = %work.work_id, %msg, "abandoning unit after conflict");
                        }
                        Err(e @ (Error::UnsupportedLanguage(_) | Error::Config(_))) => {
                            return Err(e);
                        }
                        Err(e) => {
                            warn!(work_id = %work.work_id, error = %e, "unit failed");
                            self.set_status(WorkerState::Error, None).await;
                        }
                    }
                }
                Ok(None) => {
                    let pause = rand::thread_rng().gen_range(IDLE_SLEEP_MIN_MS..=IDLE_SLEEP_MAX_MS);
                    debug!(pause_ms = pause, "no work available");
                    tokio::select! {
                        _ = sleep(Duration::from_millis(pause)) => {}
                        _ = shutdown.changed() => {}
                    }
                }
                Err(Error::CoordinationConflict(msg)) => {
                    // The master still sees an active unit for us; the sweep
                    // will clear it once our ownership lapses.
                    warn!(%msg, "claim conflict, waiting before retry");
                    tokio::select! {
                        _ = sleep(Duration::from_secs(10)) => {}
                        _ = shutdown.changed() => {}
                    }
                }
                Err(e) => {
                    warn!(error = %e, "could not reach master, retrying");
                    tokio::select! {
                        _ = sleep(Duration::from_secs(5)) => {}
                        _ = shutdown.changed() => {}
                    }
                }
            }
        }
    }

    async fn set_status(&self, state: WorkerState, current_work_id: Option<String>) {
        let mut status = self.status.write().await;
        status.state = state;
        status.current_work_id = current_work_id;
    }

    async fn run_unit(
        &self,
        work: &WorkResponse,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<UnitOutcome> {
        let extractor = create_extractor(&work.source, &self.config)?;
        self.process_unit(extractor, work, shutdown).await
    }

    /// Process one unit with an explicit extractor (tests inject mocks
    /// here; `run` goes through the factory).
    pub async fn process_unit(
        &self,
        extractor: Arc<dyn SourceExtractor>,
        work: &WorkResponse,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<UnitOutcome> {
        let allocator = Arc::new(AllocatorHandle(self.store.clone()));
        let converter =
            AqeaConverter::new(&work.language, &work.source, &self.worker_id, allocator)?;

        let (tx, mut rx) = mpsc::channel::<ExtractorEvent>(self.config.batch_size.max(1) * 2);
        let extract_task = {
            let extractor = Arc::clone(&extractor);
            let language = work.language.clone();
            let range_start = work.range_start.clone();
            let range_end = work.range_end.clone();
            tokio::spawn(async move {
                extractor
                    .extract_range(&language, &range_start, &range_end, tx)
                    .await
            })
        };

        let mut run = UnitRun {
            pipeline: self,
            work,
            converter,
            batch: Vec::new(),
            processed: 0,
            soft_errors: 0,
            pending_errors: Vec::new(),
            rate_per_minute: 0.0,
            current_batch_size: self.config.batch_size.max(1),
            inter_batch_delay: Duration::ZERO,
            window_start: Instant::now(),
            window_count: 0,
        };
        let mut flush_ticker = interval(Duration::from_secs(self.config.flush_interval_secs.max(1)));
        flush_ticker.tick().await; // the first tick is immediate

        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Some(event) => run.ingest(event).await?,
                    None => break,
                },
                _ = flush_ticker.tick() => {
                    if !run.batch.is_empty() {
                        run.flush_and_report().await?;
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!(work_id = %work.work_id, "shutdown during unit, flushing and aborting");
                        extract_task.abort();
                        run.flush().await;
                        let _ = run.report_progress(true).await;
                        return Ok(UnitOutcome {
                            processed: run.processed,
                            soft_errors: run.soft_errors,
                            aborted: true,
                        });
                    }
                }
            }
        }

        // Extractor stream drained; surface a hard range failure if any.
        let extraction = match extract_task.await {
            Ok(result) => result,
            Err(join_error) => Err(Error::UpstreamFetch(format!(
                "extractor task died: {join_error}"
            ))),
        };
        run.flush_and_report().await?;

        match extraction {
            Ok(()) => {
                self.client
                    .complete(&work.work_id, &self.worker_id, run.processed, true)
                    .await?;
                Ok(UnitOutcome {
                    processed: run.processed,
                    soft_errors: run.soft_errors,
                    aborted: false,
                })
            }
            Err(e) => {
                warn!(work_id = %work.work_id, error = %e, "range extraction failed");
                self.client
                    .complete(&work.work_id, &self.worker_id, run.processed, false)
                    .await?;
                Err(e)
            }
        }
    }
}

struct UnitRun<'a> {
    pipeline: &'a WorkerPipeline,
    work: &'a WorkResponse,
    converter: AqeaConverter,
    batch: Vec<AqeaEntry>,
    processed: i64,
    soft_errors: u64,
    pending_errors: Vec<WorkError>,
    rate_per_minute: f64,
    current_batch_size: usize,
    inter_batch_delay: Duration,
    window_start: Instant,
    window_count: i64,
}

impl UnitRun<'_> {
    async fn ingest(&mut self, event: ExtractorEvent) -> Result<()> {
        match event {
            ExtractorEvent::Record(record) => {
                self.processed += 1;
                self.window_count += 1;
                match self.converter.convert(&record).await {
                    Ok(entry) => self.batch.push(entry),
                    Err(e @ Error::UnsupportedLanguage(_)) => return Err(e),
                    Err(e) => {
                        debug!(word = %record.word, error = %e, "record skipped");
                        self.push_soft_error(soft_error_kind(&e), e.to_string());
                    }
                }
                if self.batch.len() >= self.current_batch_size {
                    self.flush_and_report().await?;
                }
            }
            ExtractorEvent::SoftError(error) => {
                self.push_soft_error(error.kind, error.detail);
            }
        }
        Ok(())
    }

    fn push_soft_error(&mut self, kind: impl Into<String>, detail: impl Into<String>) {
        self.soft_errors += 1;
        self.pending_errors.push(WorkError {
            kind: kind.into(),
            detail: detail.into(),
        });
    }

    async fn flush_and_report(&mut self) -> Result<()> {
        self.flush().await;
        self.report_progress(false).await
    }

    /// Upsert the batch with backoff; on persistent failure write it to
    /// the fallback file instead. Adjusts the backpressure knobs either
    /// way.
    async fn flush(&mut self) {
        if self.batch.is_empty() {
            return;
        }
        self.update_rate();
        let entries = std::mem::take(&mut self.batch);
        let store = &self.pipeline.store;
        let outcome = with_backoff("upsert_batch", || store.upsert_batch(&entries)).await;
        match outcome {
            Ok(stats) => {
                debug!(
                    inserted = stats.inserted,
                    updated = stats.updated,
                    "batch flushed"
                );
                self.current_batch_size =
                    (self.current_batch_size + 10).min(self.pipeline.config.batch_size.max(1));
                self.inter_batch_delay =
                    self.inter_batch_delay.saturating_sub(Duration::from_secs(1));
            }
            Err(e) => {
                warn!(error = %e, entries = entries.len(), "batch upsert failed past retries");
                self.current_batch_size = (self.current_batch_size / 2).max(MIN_BATCH_SIZE);
                self.inter_batch_delay = (self.inter_batch_delay + Duration::from_secs(1))
                    .min(MAX_INTER_BATCH_DELAY);
                match write_fallback_batch(
                    &self.pipeline.config.fallback_dir,
                    &self.pipeline.worker_id,
                    &entries,
                ) {
                    Ok(path) => self.push_soft_error(
                        "store",
                        format!("batch diverted to {}", path.display()),
                    ),
                    Err(write_error) => self.push_soft_error(
                        "store",
                        format!("batch lost: upsert failed ({e}) and fallback failed ({write_error})"),
                    ),
                }
            }
        }
        if !self.inter_batch_delay.is_zero() {
            sleep(self.inter_batch_delay).await;
        }
    }

    /// EWMA of the per-minute throughput, measured per flush window.
    fn update_rate(&mut self) {
        let elapsed = self.window_start.elapsed().as_secs_f64();
        if elapsed > 0.0 && self.window_count > 0 {
            let instantaneous = self.window_count as f64 / elapsed * 60.0;
            self.rate_per_minute = if self.rate_per_minute == 0.0 {
                instantaneous
            } else {
                RATE_ALPHA * instantaneous + (1.0 - RATE_ALPHA) * self.rate_per_minute
            };
        }
        self.window_start = Instant::now();
        self.window_count = 0;
    }

    /// Progress failures other than ownership conflicts are tolerated: the
    /// worker keeps processing and the next report carries the errors.
    async fn report_progress(&mut self, aborting: bool) -> Result<()> {
        let errors = self.pending_errors.clone();
        let result = self
            .pipeline
            .client
            .report_progress(
                &self.work.work_id,
                &self.pipeline.worker_id,
                self.processed,
                self.rate_per_minute,
                errors,
                aborting,
            )
            .await;
        match result {
            Ok(()) => {
                self.pending_errors.clear();
                Ok(())
            }
            Err(e @ Error::CoordinationConflict(_)) => Err(e),
            Err(e) => {
                warn!(error = %e, "progress report failed, will retry with next flush");
                Ok(())
            }
        }
    }
}

fn soft_error_kind(error: &Error) -> &'static str {
    match error {
        Error::Conversion(_) => "conversion",
        Error::AddressSpaceExhausted { .. } => "address_space_exhausted",
        Error::UpstreamFetch(_) => "upstream_fetch",
        _ => "store",
    }
}
