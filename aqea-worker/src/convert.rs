//! AQEA conversion
//!
//! Turns one raw record into one addressed entry. The address is composed
//! as AA (language table), QQ (POS table), EE (frequency-banded semantic
//! cluster), A2 (allocator). AA:QQ:EE is a pure function of the record, so
//! re-running conversion for the same lemma lands in the same tuple and the
//! allocator returns the previously reserved A2.

use std::sync::Arc;

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::debug;

use aqea_common::address::AqeaAddress;
use aqea_common::model::{AqeaEntry, EntryMeta, RawRecord};
use aqea_common::store::AddressAllocator;
use aqea_common::{lang, pos, Error, Result};

/// Caps applied to list-valued meta fields.
const MAX_DEFINITIONS: usize = 10;
const MAX_EXAMPLES: usize = 3;
const MAX_SYNONYMS: usize = 5;
const MAX_FORMS: usize = 5;

/// Description definitions are trimmed to this many characters.
const DESCRIPTION_DEF_CHARS: usize = 200;

pub struct AqeaConverter {
    language: String,
    language_name: &'static str,
    language_family: Option<&'static str>,
    aa: u8,
    source: String,
    worker_id: String,
    allocator: Arc<dyn AddressAllocator>,
}

impl AqeaConverter {
    pub fn new(
        language: &str,
        source: &str,
        worker_id: &str,
        allocator: Arc<dyn AddressAllocator>,
    ) -> Result<Self> {
        let language = lang::normalize_language_code(language);
        let aa = lang::aa_for_language(&language)?;
        Ok(Self {
            language_name: lang::language_name(&language)?,
            language_family: lang::family_for_aa(aa),
            language,
            aa,
            source: source.to_string(),
            worker_id: worker_id.to_string(),
            allocator,
        })
    }

    /// Convert one record. Soft failures (empty lemma, exhausted address
    /// tuple) come back as errors for the pipeline to count and skip.
    pub async fn convert(&self, record: &RawRecord) -> Result<AqeaEntry> {
        let lemma = record.word.trim();
        if lemma.is_empty() {
            return Err(Error::Conversion("empty lemma".into()));
        }
        if lemma.chars().any(|c| c.is_control()) {
            return Err(Error::Conversion(format!(
                "lemma '{}' contains control characters",
                lemma.escape_debug()
            )));
        }

        let pos_name = record
            .pos
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or("unknown")
            .to_lowercase();
        let qq = pos::qq_for_pos(&pos_name);

        let digest = address_digest(lemma, &pos_name, &self.language, &record.definitions);
        let ee = semantic_cluster(digest[0], record.frequency_rank);
        let preferred = preferred_element_id(&digest);

        let a2 = self
            .allocator
            .allocate(self.aa, qq, ee, lemma, preferred, &self.worker_id)
            .await?;
        let address = AqeaAddress::new(self.aa, qq, ee, a2)?;
        debug!(%address, lemma, pos = pos_name, "converted record");

        let now = Utc::now();
        Ok(AqeaEntry {
            address,
            label: lemma.to_string(),
            description: self.build_description(lemma, &pos_name, record),
            domain: address.domain_string(),
            status: "active".into(),
            created_at: now,
            updated_at: now,
            lang_ui: self.language.clone(),
            meta: self.build_meta(lemma, &pos_name, record),
            relations: Vec::new(),
        })
    }

    /// `"{Language} {pos} '{lemma}'. {first definition}"`, definition
    /// trimmed, plus the pronunciation when known.
    fn build_description(&self, lemma: &str, pos_name: &str, record: &RawRecord) -> String {
        let mut description = match record.definitions.first() {
            Some(definition) => {
                let trimmed: String = definition.chars().take(DESCRIPTION_DEF_CHARS).collect();
                format!(
                    "{} {} '{}'. {}",
                    self.language_name, pos_name, lemma, trimmed
                )
            }
            None => format!("{} {} '{}'", self.language_name, pos_name, lemma),
        };
        if let Some(ipa) = record.ipa.as_deref() {
            description.push_str(&format!(" Pronunciation: /{ipa}/"));
        }
        description
    }

    fn build_meta(&self, lemma: &str, pos_name: &str, record: &RawRecord) -> EntryMeta {
        let mut definitions = record.definitions.clone();
        definitions.truncate(MAX_DEFINITIONS);
        let mut examples = record.examples.clone();
        examples.truncate(MAX_EXAMPLES);
        let mut synonyms = record.synonyms.clone();
        synonyms.truncate(MAX_SYNONYMS);
        let mut forms = record.forms.clone();
        forms.truncate(MAX_FORMS);

        EntryMeta {
            lemma: lemma.to_string(),
            pos: pos_name.to_string(),
            ipa: record.ipa.clone(),
            definitions,
            examples,
            synonyms,
            antonyms: record.antonyms.clone(),
            translations: record.translations.clone(),
            audio: record.audio.clone(),
            hyphenation: record.hyphenation.clone(),
            forms,
            labels: record.labels.clone(),
            frequency_rank: record.frequency_rank,
            frequency_est: Some(estimate_frequency(record)),
            richness_score: Some(richness_score(record)),
            language: self.language.clone(),
            language_name: Some(self.language_name.to_string()),
            language_family: self.language_family.map(str::to_string),
            source: self.source.clone(),
            worker_id: self.worker_id.clone(),
            created_at: Utc::now(),
        }
    }
}

/// Sha256 over `lemma|pos|language|first_definition`. Byte 0 is the
/// semantic domain integer; bytes 0..8 seed the element-ID hint. Pure in
/// its inputs, so a converter re-run reproduces AA:QQ:EE exactly.
fn address_digest(lemma: &str, pos_name: &str, language: &str, definitions: &[String]) -> [u8; 32] {
    let first_def = definitions.first().map(String::as_str).unwrap_or("");
    let mut hasher = Sha256::new();
    hasher.update(lemma.as_bytes());
    hasher.update(b"|");
    hasher.update(pos_name.as_bytes());
    hasher.update(b"|");
    hasher.update(language.as_bytes());
    hasher.update(b"|");
    hasher.update(first_def.as_bytes());
    hasher.finalize().into()
}

/// Band the semantic domain integer by frequency rank. Unknown ranks land
/// in the lowest band. The top band uses mod 127 so `0xFF` is never
/// produced; no band can reach `0x00`.
fn semantic_cluster(domain: u8, frequency_rank: Option<u32>) -> u8 {
    let d = domain as u32;
    let ee = match frequency_rank {
        Some(rank) if rank <= 1_000 => 0x10 + (d % 16),
        Some(rank) if rank <= 10_000 => 0x20 + (d % 32),
        Some(rank) if rank <= 100_000 => 0x40 + (d % 64),
        _ => 0x80 + (d % 127),
    };
    ee as u8
}

/// Deterministic A2 seed in `[0x01, 0xFA]`, derived from the digest the
/// same way for every producer.
fn preferred_element_id(digest: &[u8; 32]) -> u8 {
    let word = u64::from_be_bytes(digest[..8].try_into().expect("8 bytes"));
    ((word % 250) + 1) as u8
}

/// Frequency estimate when no external rank is known: shorter words and
/// core parts of speech score higher, as do richly defined entries. Stored
/// in meta only; EE banding never uses it.
fn estimate_frequency(record: &RawRecord) -> u32 {
    let mut estimate: u32 = 1000;
    let len = record.word.chars().count();
    if len <= 3 {
        estimate += 500;
    } else if len <= 5 {
        estimate += 200;
    }
    if let Some(pos_name) = record.pos.as_deref() {
        if matches!(pos_name, "noun" | "verb" | "adjective") {
            estimate += 300;
        }
    }
    estimate += record.definitions.len() as u32 * 50;
    estimate.min(9999)
}

/// Additive 0-100 rubric over the metadata a record carries.
fn richness_score(record: &RawRecord) -> u8 {
    let mut score = 0u8;
    if !record.word.is_empty() {
        score += 5;
    }
    if record.pos.is_some() {
        score += 5;
    }
    if !record.definitions.is_empty() {
        score += 10;
    }
    if record.ipa.is_some() {
        score += 15;
    }
    if !record.audio.is_empty() {
        score += 10;
    }
    if !record.forms.is_empty() {
        score += 15;
    }
    if record.hyphenation.is_some() {
        score += 5;
    }
    if !record.examples.is_empty() {
        score += 15;
    }
    if !record.synonyms.is_empty() {
        score += 10;
    }
    if !record.labels.is_empty() {
        score += 5;
    }
    score.min(100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aqea_common::store::MemoryStore;

    fn converter(store: Arc<MemoryStore>) -> AqeaConverter {
        AqeaConverter::new("deu", "wiktionary", "w1", store).unwrap()
    }

    fn record(word: &str, pos: &str, definitions: &[&str]) -> RawRecord {
        RawRecord {
            word: word.into(),
            language: "deu".into(),
            pos: Some(pos.into()),
            definitions: definitions.iter().map(|s| s.to_string()).collect(),
            ..RawRecord::default()
        }
    }

    #[tokio::test]
    async fn produces_in_range_addresses() {
        let store = Arc::new(MemoryStore::new());
        let entry = converter(store)
            .convert(&record("Apfel", "noun", &["rundliche Frucht"]))
            .await
            .unwrap();
        let addr = entry.address;
        assert_eq!(addr.aa(), 0xA0);
        assert_eq!(addr.qq(), 0x01);
        assert!(addr.ee() != 0x00 && addr.ee() != 0xFF);
        assert!((0x01..=0xFE).contains(&addr.a2()));
        assert_eq!(entry.domain, "0xA0");
        assert!(entry.description.starts_with("German noun 'Apfel'."));
    }

    #[tokio::test]
    async fn conversion_is_deterministic() {
        let store = Arc::new(MemoryStore::new());
        let conv = converter(store);
        let input = record("Brot", "noun", &["aus Mehl gebackenes Nahrungsmittel"]);
        let first = conv.convert(&input).await.unwrap();
        let second = conv.convert(&input).await.unwrap();
        assert_eq!(first.address, second.address);
    }

    #[tokio::test]
    async fn empty_lemma_is_a_soft_conversion_error() {
        let store = Arc::new(MemoryStore::new());
        let conv = converter(store.clone());
        let err = conv.convert(&record("  ", "noun", &[])).await.unwrap_err();
        assert!(matches!(err, Error::Conversion(_)));
        // no address may be consumed by a failed conversion
        assert_eq!(store.allocation_stats().await.unwrap().total_allocated, 0);
    }

    #[tokio::test]
    async fn missing_pos_maps_to_unknown() {
        let store = Arc::new(MemoryStore::new());
        let mut input = record("Tja", "noun", &[]);
        input.pos = None;
        let entry = converter(store).convert(&input).await.unwrap();
        assert_eq!(entry.address.qq(), 0xFF);
        assert_eq!(entry.meta.pos, "unknown");
    }

    #[tokio::test]
    async fn unsupported_language_is_fatal() {
        let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
        assert!(matches!(
            AqeaConverter::new("tlh", "wiktionary", "w1", store).err(),
            Some(Error::UnsupportedLanguage(_))
        ));
    }

    #[test]
    fn clusters_respect_reserved_bytes() {
        for domain in 0..=255u16 {
            for rank in [None, Some(500), Some(5_000), Some(50_000), Some(500_000)] {
                let ee = semantic_cluster(domain as u8, rank);
                assert!(ee != 0x00 && ee != 0xFF, "domain {domain} rank {rank:?} gave 0x{ee:02X}");
            }
        }
    }

    #[test]
    fn clusters_band_by_rank() {
        let d = 0xAB;
        assert!((0x10..=0x1F).contains(&semantic_cluster(d, Some(900))));
        assert!((0x20..=0x3F).contains(&semantic_cluster(d, Some(9_000))));
        assert!((0x40..=0x7F).contains(&semantic_cluster(d, Some(90_000))));
        assert!((0x80..=0xFE).contains(&semantic_cluster(d, Some(900_000))));
        assert!((0x80..=0xFE).contains(&semantic_cluster(d, None)));
    }

    #[tokio::test]
    async fn address_decodes_back_to_its_components() {
        let store = Arc::new(MemoryStore::new());
        let entry = converter(store)
            .convert(&record("Dach", "noun", &["oberer Abschluss eines Gebäudes"]))
            .await
            .unwrap();
        assert_eq!(lang::language_for_aa(entry.address.aa()), Some("deu"));
        assert_eq!(pos::pos_for_qq(entry.address.qq()), Some("noun"));
        assert_eq!(lang::family_for_aa(entry.address.aa()), Some("germanic"));
    }

    #[test]
    fn ipa_reaches_the_description() {
        let mut input = record("Auto", "noun", &["Kraftfahrzeug"]);
        input.ipa = Some("ˈaʊ̯to".into());
        let store = Arc::new(MemoryStore::new());
        let conv = AqeaConverter::new("de", "wiktionary", "w1", store).unwrap();
        let description = conv.build_description("Auto", "noun", &input);
        assert!(description.ends_with("Pronunciation: /ˈaʊ̯to/"));
    }

    #[test]
    fn frequency_estimate_heuristics() {
        let short = record("ja", "adverb", &["affirmation"]);
        let long = record("Donaudampfschifffahrt", "noun", &[]);
        assert!(estimate_frequency(&short) > estimate_frequency(&long));
        assert!(estimate_frequency(&short) <= 9999);
    }
}
