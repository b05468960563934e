//! Source extractors
//!
//! An extractor streams raw lexical records for a lemma-prefix range into a
//! channel. Implementations are selected by source name through a small
//! factory so new upstreams slot in without touching the pipeline.

mod wikitext;
mod wiktionary;

pub use wiktionary::WiktionaryExtractor;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use aqea_common::api::WorkError;
use aqea_common::config::WorkerConfig;
use aqea_common::model::RawRecord;
use aqea_common::{Error, Result};

/// One event on the extraction stream. Soft errors travel in-band so the
/// pipeline can count and report them without stopping the stream.
#[derive(Debug)]
pub enum ExtractorEvent {
    Record(RawRecord),
    SoftError(WorkError),
}

/// A pluggable record source.
///
/// `extract_range` streams events for every lemma in
/// `[range_start, range_end]` (lexicographic, inclusive prefixes) and
/// returns once the range is drained. An `Err` return is a hard failure of
/// the whole range; per-record problems are `SoftError` events.
#[async_trait]
pub trait SourceExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn extract_range(
        &self,
        language: &str,
        range_start: &str,
        range_end: &str,
        tx: mpsc::Sender<ExtractorEvent>,
    ) -> Result<()>;
}

/// Supported source kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractorKind {
    Wiktionary,
    Mock,
}

impl ExtractorKind {
    pub fn parse(source: &str) -> Result<Self> {
        match source {
            "wiktionary" => Ok(ExtractorKind::Wiktionary),
            "mock" => Ok(ExtractorKind::Mock),
            other => Err(Error::Config(format!("unknown source '{other}'"))),
        }
    }
}

/// Build the extractor for a work unit's source.
pub fn create_extractor(source: &str, config: &WorkerConfig) -> Result<Arc<dyn SourceExtractor>> {
    match ExtractorKind::parse(source)? {
        ExtractorKind::Wiktionary => Ok(Arc::new(WiktionaryExtractor::new(config)?)),
        ExtractorKind::Mock => Ok(Arc::new(MockExtractor::default())),
    }
}

/// Canned extractor used by tests and dry runs. Yields its records filtered
/// to the requested range, in order.
#[derive(Debug, Default)]
pub struct MockExtractor {
    pub records: Vec<RawRecord>,
}

impl MockExtractor {
    pub fn new(records: Vec<RawRecord>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl SourceExtractor for MockExtractor {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn extract_range(
        &self,
        language: &str,
        range_start: &str,
        range_end: &str,
        tx: mpsc::Sender<ExtractorEvent>,
    ) -> Result<()> {
        let range_ceiling = format!("{range_end}{}", char::MAX);
        for record in &self.records {
            if record.language != language {
                continue;
            }
            let word = record.word.as_str();
            if word < range_start || word > range_ceiling.as_str() {
                continue;
            }
            if tx
                .send(ExtractorEvent::Record(record.clone()))
                .await
                .is_err()
            {
                break;
            }
        }
        Ok(())
    }
}
