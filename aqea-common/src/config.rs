//! Configuration loading
//!
//! Both binaries read a single TOML file. The path is resolved in priority
//! order: command-line argument, then the `AQEA_CONFIG` environment
//! variable, then `aqea.toml` in the working directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::lang;
use crate::{Error, Result};

/// One weighted lemma-prefix range of a language plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlphabetRange {
    pub start: String,
    pub end: String,
    pub weight: f64,
}

/// Extraction plan for one language.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguagePlan {
    /// ISO 639-3 (or 639-1, bridged at load time) code.
    pub language_code: String,
    /// Used only for progress estimation.
    pub estimated_entries: u64,
    pub alphabet_ranges: Vec<AlphabetRange>,
}

impl LanguagePlan {
    /// Normalize the language code and check the plan invariants: a
    /// resolvable language, at least one range, positive weights summing to
    /// one, and ordered range bounds.
    pub fn validate(&mut self) -> Result<()> {
        self.language_code = lang::normalize_language_code(&self.language_code);
        lang::aa_for_language(&self.language_code)?;

        if self.alphabet_ranges.is_empty() {
            return Err(Error::Config(format!(
                "language plan for '{}' has no alphabet ranges",
                self.language_code
            )));
        }
        let mut total = 0.0;
        for range in &self.alphabet_ranges {
            if range.weight <= 0.0 {
                return Err(Error::Config(format!(
                    "range {}-{} has non-positive weight {}",
                    range.start, range.end, range.weight
                )));
            }
            if range.start > range.end {
                return Err(Error::Config(format!(
                    "range start '{}' sorts after end '{}'",
                    range.start, range.end
                )));
            }
            total += range.weight;
        }
        if (total - 1.0).abs() > 1e-6 {
            return Err(Error::Config(format!(
                "alphabet range weights sum to {total}, expected 1.0"
            )));
        }
        Ok(())
    }
}

/// One storage backend candidate, tried in configuration order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    /// Central SQL backend (Postgres / Supabase connection string).
    Postgres { url: String },
    /// Local embedded backend.
    Sqlite { path: PathBuf },
    /// In-memory backend; workers pair it with the NDJSON file fallback.
    Memory,
}

fn default_backends() -> Vec<BackendConfig> {
    vec![
        BackendConfig::Sqlite {
            path: PathBuf::from("data/aqea.db"),
        },
        BackendConfig::Memory,
    ]
}

/// Storage selection, shared by master and worker sections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_backends")]
    pub backends: Vec<BackendConfig>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backends: default_backends(),
        }
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".into()
}
fn default_heartbeat_timeout() -> u64 {
    120
}
fn default_sweep_interval() -> u64 {
    30
}
fn default_worker_ttl() -> u64 {
    3600
}
fn default_max_retries() -> i32 {
    3
}

/// Master coordinator section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    pub source: String,
    pub plan: LanguagePlan,
    #[serde(default = "default_heartbeat_timeout")]
    pub heartbeat_timeout_secs: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    /// Offline workers are dropped from the roster after this long.
    #[serde(default = "default_worker_ttl")]
    pub worker_ttl_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: i32,
    #[serde(default)]
    pub store: StoreConfig,
}

fn default_batch_size() -> usize {
    100
}
fn default_flush_interval() -> u64 {
    5
}
fn default_request_delay_ms() -> u64 {
    200
}
fn default_max_concurrent() -> usize {
    5
}
fn default_fallback_dir() -> PathBuf {
    PathBuf::from("extracted_data")
}
fn default_upstream_timeout() -> u64 {
    30
}

/// Worker section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub master_url: String,
    /// Stable id; a UUID-suffixed one is minted when absent.
    pub worker_id: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_flush_interval")]
    pub flush_interval_secs: u64,
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,
    #[serde(default = "default_upstream_timeout")]
    pub upstream_timeout_secs: u64,
    #[serde(default = "default_fallback_dir")]
    pub fallback_dir: PathBuf,
    #[serde(default)]
    pub store: StoreConfig,
}

/// Top-level configuration file. A process reads only its own section but
/// one file can serve a whole deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub master: Option<MasterConfig>,
    pub worker: Option<WorkerConfig>,
}

impl Config {
    /// Load and validate from an explicit path.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let mut config: Config = toml::from_str(&raw)
            .map_err(|e| Error::Config(format!("cannot parse {}: {e}", path.display())))?;
        if let Some(master) = config.master.as_mut() {
            master.plan.validate()?;
        }
        Ok(config)
    }

    /// Resolve the config path in priority order: CLI argument, the
    /// `AQEA_CONFIG` environment variable, `./aqea.toml`, then the
    /// platform config directory (`~/.config/aqea/aqea.toml` on Linux).
    pub fn resolve_path(cli_arg: Option<&str>) -> PathBuf {
        if let Some(path) = cli_arg {
            return PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("AQEA_CONFIG") {
            return PathBuf::from(path);
        }
        let local = PathBuf::from("aqea.toml");
        if local.exists() {
            return local;
        }
        dirs::config_dir()
            .map(|dir| dir.join("aqea").join("aqea.toml"))
            .unwrap_or(local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(code: &str, ranges: &[(&str, &str, f64)]) -> LanguagePlan {
        LanguagePlan {
            language_code: code.into(),
            estimated_entries: 1000,
            alphabet_ranges: ranges
                .iter()
                .map(|(s, e, w)| AlphabetRange {
                    start: (*s).into(),
                    end: (*e).into(),
                    weight: *w,
                })
                .collect(),
        }
    }

    #[test]
    fn plan_validation_accepts_weighted_partition() {
        let mut p = plan("deu", &[("A", "M", 0.6), ("N", "Z", 0.4)]);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn plan_normalizes_two_letter_codes() {
        let mut p = plan("de", &[("A", "Z", 1.0)]);
        p.validate().unwrap();
        assert_eq!(p.language_code, "deu");
    }

    #[test]
    fn plan_rejects_bad_weights() {
        let mut p = plan("deu", &[("A", "M", 0.5), ("N", "Z", 0.4)]);
        assert!(p.validate().is_err());
        let mut p = plan("deu", &[("A", "Z", -1.0)]);
        assert!(p.validate().is_err());
    }

    #[test]
    fn plan_rejects_unsupported_language() {
        let mut p = plan("tlh", &[("A", "Z", 1.0)]);
        assert!(matches!(p.validate(), Err(Error::UnsupportedLanguage(_))));
    }

    #[test]
    fn plan_rejects_inverted_range() {
        let mut p = plan("deu", &[("Z", "A", 1.0)]);
        assert!(p.validate().is_err());
    }

    #[test]
    fn config_parses_full_file() {
        let toml = r#"
            [master]
            source = "wiktionary"
            bind_addr = "127.0.0.1:8080"

            [master.plan]
            language_code = "deu"
            estimated_entries = 800000
            alphabet_ranges = [
                { start = "A", end = "E", weight = 0.3 },
                { start = "F", end = "Z", weight = 0.7 },
            ]

            [[master.store.backends]]
            kind = "sqlite"
            path = "data/aqea.db"

            [[master.store.backends]]
            kind = "memory"

            [worker]
            master_url = "http://127.0.0.1:8080"
            batch_size = 50
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        let master = config.master.unwrap();
        assert_eq!(master.plan.alphabet_ranges.len(), 2);
        assert_eq!(master.heartbeat_timeout_secs, 120);
        let worker = config.worker.unwrap();
        assert_eq!(worker.batch_size, 50);
        assert_eq!(worker.request_delay_ms, 200);
    }
}
