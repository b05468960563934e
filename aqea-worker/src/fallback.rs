//! NDJSON fallback persistence
//!
//! When a batch cannot be upserted past the retry budget it is written to
//! `extracted_data/aqea_entries_{worker_id}_{unix_ms}.json`, one entry per
//! line, for later re-ingestion by a one-shot importer.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::warn;

use aqea_common::model::AqeaEntry;
use aqea_common::time::unix_ms;
use aqea_common::Result;

pub fn write_fallback_batch(
    dir: &Path,
    worker_id: &str,
    entries: &[AqeaEntry],
) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!(
        "aqea_entries_{worker_id}_{}.json",
        unix_ms(Utc::now())
    ));
    let mut file = std::fs::File::create(&path)?;
    for entry in entries {
        serde_json::to_writer(&mut file, entry)?;
        file.write_all(b"\n")?;
    }
    file.flush()?;
    warn!(
        path = %path.display(),
        entries = entries.len(),
        "batch written to fallback file"
    );
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aqea_common::address::AqeaAddress;
    use aqea_common::model::EntryMeta;

    fn entry(a2: u8) -> AqeaEntry {
        let now = Utc::now();
        AqeaEntry {
            address: AqeaAddress::new(0xA0, 0x01, 0x12, a2).unwrap(),
            label: "Apfel".into(),
            description: "German noun 'Apfel'.".into(),
            domain: "0xA0".into(),
            status: "active".into(),
            created_at: now,
            updated_at: now,
            lang_ui: "deu".into(),
            meta: EntryMeta {
                lemma: "Apfel".into(),
                pos: "noun".into(),
                language: "deu".into(),
                source: "wiktionary".into(),
                worker_id: "w1".into(),
                created_at: now,
                ..EntryMeta::default()
            },
            relations: Vec::new(),
        }
    }

    #[test]
    fn round_trips_one_entry_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let entries = vec![entry(0x01), entry(0x02), entry(0x03)];
        let path = write_fallback_batch(dir.path(), "w1", &entries).unwrap();
        assert!(path
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("aqea_entries_w1_"));

        let contents = std::fs::read_to_string(&path).unwrap();
        let parsed: Vec<AqeaEntry> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[1].address, entries[1].address);
    }
}
