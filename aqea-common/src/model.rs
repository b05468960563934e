//! Data model shared by master, workers, and the storage layer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::address::AqeaAddress;
use crate::{Error, Result};

/// Work unit lifecycle.
///
/// ```text
/// pending -> assigned -> processing -> completed
///    ^          |             |
///    +---- timeout/reassign --+--> failed (retries exhausted)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkUnitStatus {
    Pending,
    Assigned,
    Processing,
    Completed,
    Failed,
}

impl WorkUnitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkUnitStatus::Pending => "pending",
            WorkUnitStatus::Assigned => "assigned",
            WorkUnitStatus::Processing => "processing",
            WorkUnitStatus::Completed => "completed",
            WorkUnitStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(WorkUnitStatus::Pending),
            "assigned" => Ok(WorkUnitStatus::Assigned),
            "processing" => Ok(WorkUnitStatus::Processing),
            "completed" => Ok(WorkUnitStatus::Completed),
            "failed" => Ok(WorkUnitStatus::Failed),
            other => Err(Error::InvalidInput(format!("unknown unit status '{other}'"))),
        }
    }

    /// Whether the unit is currently owned by a worker.
    pub fn is_active(&self) -> bool {
        matches!(self, WorkUnitStatus::Assigned | WorkUnitStatus::Processing)
    }
}

/// A lemma-prefix range for one language and source, the atomic unit of
/// assignment. Mutated only by the master (state transitions) and the
/// assigned worker (progress).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkUnit {
    pub work_id: String,
    pub language: String,
    pub source: String,
    pub range_start: String,
    pub range_end: String,
    pub estimated_entries: i64,
    pub status: WorkUnitStatus,
    pub assigned_worker: Option<String>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub entries_processed: i64,
    pub retry_count: i32,
    pub max_retries: i32,
    pub last_error: Option<String>,
}

impl WorkUnit {
    /// A fresh pending unit with default retry budget.
    pub fn new(
        work_id: String,
        language: String,
        source: String,
        range_start: String,
        range_end: String,
        estimated_entries: i64,
    ) -> Self {
        Self {
            work_id,
            language,
            source,
            range_start,
            range_end,
            estimated_entries,
            status: WorkUnitStatus::Pending,
            assigned_worker: None,
            assigned_at: None,
            started_at: None,
            completed_at: None,
            entries_processed: 0,
            retry_count: 0,
            max_retries: 3,
            last_error: None,
        }
    }
}

/// Worker liveness state as tracked by the coordination store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Idle,
    Working,
    Error,
    Offline,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Idle => "idle",
            WorkerState::Working => "working",
            WorkerState::Error => "error",
            WorkerState::Offline => "offline",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "idle" => Ok(WorkerState::Idle),
            "working" => Ok(WorkerState::Working),
            "error" => Ok(WorkerState::Error),
            "offline" => Ok(WorkerState::Offline),
            other => Err(Error::InvalidInput(format!(
                "unknown worker state '{other}'"
            ))),
        }
    }
}

/// A registered worker as seen by the master.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub worker_id: String,
    pub ip: Option<String>,
    pub state: WorkerState,
    pub current_work_id: Option<String>,
    pub total_processed: i64,
    pub average_rate: f64,
    pub last_heartbeat: DateTime<Utc>,
    pub registered_at: DateTime<Utc>,
}

/// A raw lexical record as produced by a source extractor, before AQEA
/// conversion. String fields are already normalized (trimmed, wiki markup
/// stripped) by the extractor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawRecord {
    pub word: String,
    pub language: String,
    pub pos: Option<String>,
    #[serde(default)]
    pub definitions: Vec<String>,
    pub ipa: Option<String>,
    #[serde(default)]
    pub audio: Vec<String>,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default)]
    pub synonyms: Vec<String>,
    #[serde(default)]
    pub antonyms: Vec<String>,
    #[serde(default)]
    pub translations: Vec<String>,
    pub hyphenation: Option<String>,
    #[serde(default)]
    pub forms: Vec<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    pub frequency_rank: Option<u32>,
}

/// Typed entry metadata. The key set is closed: deserialization rejects
/// unknown keys so malformed producers are caught at the store boundary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntryMeta {
    pub lemma: String,
    pub pos: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipa: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub definitions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub synonyms: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub antonyms: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub translations: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub audio: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hyphenation: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub forms: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    /// Externally supplied rank, 1 = most frequent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_rank: Option<u32>,
    /// Heuristic estimate used for EE banding when no rank is known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_est: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub richness_score: Option<u8>,
    pub language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language_family: Option<String>,
    pub source: String,
    pub worker_id: String,
    pub created_at: DateTime<Utc>,
}

/// A typed relation to another entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub kind: String,
    pub target: AqeaAddress,
}

/// One stored lexical entry, keyed by its AQEA address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AqeaEntry {
    pub address: AqeaAddress,
    pub label: String,
    pub description: String,
    /// Top byte as `0xAA`, redundant with `address` for index locality.
    pub domain: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub lang_ui: String,
    pub meta: EntryMeta,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relations: Vec<Relation>,
}

impl AqeaEntry {
    /// Validate the label invariant: non-empty, no control characters.
    pub fn validate(&self) -> Result<()> {
        if self.label.is_empty() {
            return Err(Error::InvalidInput("empty entry label".into()));
        }
        if self.label.chars().any(|c| c.is_control()) {
            return Err(Error::InvalidInput(format!(
                "label '{}' contains control characters",
                self.label.escape_debug()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_string_round_trip() {
        for status in [
            WorkUnitStatus::Pending,
            WorkUnitStatus::Assigned,
            WorkUnitStatus::Processing,
            WorkUnitStatus::Completed,
            WorkUnitStatus::Failed,
        ] {
            assert_eq!(WorkUnitStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(WorkUnitStatus::parse("halted").is_err());
    }

    #[test]
    fn meta_rejects_unknown_keys() {
        let json = r#"{
            "lemma": "Apfel", "pos": "noun", "language": "deu",
            "source": "wiktionary", "worker_id": "w1",
            "created_at": "2025-01-01T00:00:00Z",
            "embedding": [1, 2, 3]
        }"#;
        assert!(serde_json::from_str::<EntryMeta>(json).is_err());
    }

    #[test]
    fn label_invariant() {
        let mut entry = AqeaEntry {
            address: AqeaAddress::new(0xA0, 0x01, 0x12, 0x01).unwrap(),
            label: "Apfel".into(),
            description: String::new(),
            domain: "0xA0".into(),
            status: "active".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            lang_ui: "deu".into(),
            meta: EntryMeta::default(),
            relations: Vec::new(),
        };
        assert!(entry.validate().is_ok());
        entry.label = "a\u{0007}b".into();
        assert!(entry.validate().is_err());
        entry.label = String::new();
        assert!(entry.validate().is_err());
    }
}
