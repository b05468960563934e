//! Static language domain tables
//!
//! Maps ISO 639-3 codes to AA domain bytes. The `0xA0-0xDF` space is split
//! into family blocks of 16 slots each: Germanic (0xA0), Romance (0xB0),
//! Slavic (0xC0), Asian (0xD0). Unassigned slots inside the blocks are
//! reserved and resolve to nothing until explicitly added here.

use crate::{Error, Result};

/// One assigned language slot.
#[derive(Debug, Clone, Copy)]
pub struct LanguageInfo {
    /// ISO 639-3 code, lowercase.
    pub iso3: &'static str,
    /// AA domain byte.
    pub aa: u8,
    /// English display name, used in generated descriptions.
    pub name: &'static str,
}

/// The assigned slots of the language domain table.
pub const LANGUAGES: &[LanguageInfo] = &[
    // Germanic block (0xA0-0xAF)
    LanguageInfo { iso3: "deu", aa: 0xA0, name: "German" },
    LanguageInfo { iso3: "eng", aa: 0xA1, name: "English" },
    LanguageInfo { iso3: "nld", aa: 0xA2, name: "Dutch" },
    LanguageInfo { iso3: "swe", aa: 0xA3, name: "Swedish" },
    LanguageInfo { iso3: "dan", aa: 0xA4, name: "Danish" },
    LanguageInfo { iso3: "nor", aa: 0xA5, name: "Norwegian" },
    LanguageInfo { iso3: "isl", aa: 0xA6, name: "Icelandic" },
    LanguageInfo { iso3: "afr", aa: 0xA7, name: "Afrikaans" },
    LanguageInfo { iso3: "yid", aa: 0xA8, name: "Yiddish" },
    LanguageInfo { iso3: "fry", aa: 0xA9, name: "Frisian" },
    // Romance block (0xB0-0xBF)
    LanguageInfo { iso3: "fra", aa: 0xB0, name: "French" },
    LanguageInfo { iso3: "spa", aa: 0xB1, name: "Spanish" },
    LanguageInfo { iso3: "ita", aa: 0xB2, name: "Italian" },
    LanguageInfo { iso3: "por", aa: 0xB3, name: "Portuguese" },
    LanguageInfo { iso3: "ron", aa: 0xB4, name: "Romanian" },
    LanguageInfo { iso3: "cat", aa: 0xB5, name: "Catalan" },
    LanguageInfo { iso3: "glg", aa: 0xB6, name: "Galician" },
    LanguageInfo { iso3: "oci", aa: 0xB7, name: "Occitan" },
    LanguageInfo { iso3: "lat", aa: 0xB8, name: "Latin" },
    LanguageInfo { iso3: "srd", aa: 0xB9, name: "Sardinian" },
    // Slavic block (0xC0-0xCF)
    LanguageInfo { iso3: "rus", aa: 0xC0, name: "Russian" },
    LanguageInfo { iso3: "pol", aa: 0xC1, name: "Polish" },
    LanguageInfo { iso3: "ces", aa: 0xC2, name: "Czech" },
    LanguageInfo { iso3: "slk", aa: 0xC3, name: "Slovak" },
    LanguageInfo { iso3: "ukr", aa: 0xC4, name: "Ukrainian" },
    LanguageInfo { iso3: "bel", aa: 0xC5, name: "Belarusian" },
    LanguageInfo { iso3: "bul", aa: 0xC6, name: "Bulgarian" },
    LanguageInfo { iso3: "hrv", aa: 0xC7, name: "Croatian" },
    LanguageInfo { iso3: "srp", aa: 0xC8, name: "Serbian" },
    LanguageInfo { iso3: "slv", aa: 0xC9, name: "Slovenian" },
    LanguageInfo { iso3: "mkd", aa: 0xCA, name: "Macedonian" },
    // Asian block (0xD0-0xDF)
    LanguageInfo { iso3: "cmn", aa: 0xD0, name: "Mandarin Chinese" },
    LanguageInfo { iso3: "yue", aa: 0xD1, name: "Cantonese" },
    LanguageInfo { iso3: "jpn", aa: 0xD2, name: "Japanese" },
    LanguageInfo { iso3: "kor", aa: 0xD3, name: "Korean" },
    LanguageInfo { iso3: "vie", aa: 0xD4, name: "Vietnamese" },
    LanguageInfo { iso3: "tha", aa: 0xD5, name: "Thai" },
    LanguageInfo { iso3: "khm", aa: 0xD6, name: "Khmer" },
    LanguageInfo { iso3: "mya", aa: 0xD7, name: "Burmese" },
    LanguageInfo { iso3: "bod", aa: 0xD8, name: "Tibetan" },
    LanguageInfo { iso3: "mon", aa: 0xD9, name: "Mongolian" },
];

/// ISO 639-1 two-letter codes accepted in configuration, normalized to the
/// ISO 639-3 codes the domain table is keyed by.
const ISO_639_1_TO_3: &[(&str, &str)] = &[
    ("de", "deu"),
    ("en", "eng"),
    ("nl", "nld"),
    ("sv", "swe"),
    ("da", "dan"),
    ("no", "nor"),
    ("is", "isl"),
    ("af", "afr"),
    ("yi", "yid"),
    ("fy", "fry"),
    ("fr", "fra"),
    ("es", "spa"),
    ("it", "ita"),
    ("pt", "por"),
    ("ro", "ron"),
    ("ca", "cat"),
    ("gl", "glg"),
    ("oc", "oci"),
    ("la", "lat"),
    ("ru", "rus"),
    ("pl", "pol"),
    ("cs", "ces"),
    ("sk", "slk"),
    ("uk", "ukr"),
    ("be", "bel"),
    ("bg", "bul"),
    ("hr", "hrv"),
    ("sr", "srp"),
    ("sl", "slv"),
    ("mk", "mkd"),
    ("zh", "cmn"),
    ("ja", "jpn"),
    ("ko", "kor"),
    ("vi", "vie"),
    ("th", "tha"),
    ("km", "khm"),
    ("my", "mya"),
    ("bo", "bod"),
    ("mn", "mon"),
];

/// Normalize a config-supplied language code to ISO 639-3.
///
/// Two-letter ISO 639-1 codes are bridged; everything else is lowercased and
/// returned as-is for the domain lookup to accept or reject.
pub fn normalize_language_code(code: &str) -> String {
    let code = code.trim().to_lowercase();
    if code.len() == 2 {
        if let Some((_, iso3)) = ISO_639_1_TO_3.iter().find(|(iso1, _)| *iso1 == code) {
            return (*iso3).to_string();
        }
    }
    code
}

fn lookup(iso3: &str) -> Option<&'static LanguageInfo> {
    LANGUAGES.iter().find(|l| l.iso3 == iso3)
}

/// Resolve an ISO 639-3 code to its AA domain byte.
pub fn aa_for_language(iso3: &str) -> Result<u8> {
    lookup(iso3)
        .map(|l| l.aa)
        .ok_or_else(|| Error::UnsupportedLanguage(iso3.to_string()))
}

/// Resolve an AA byte back to its ISO 639-3 code. Reserved slots and legacy
/// bytes resolve to nothing.
pub fn language_for_aa(aa: u8) -> Option<&'static str> {
    LANGUAGES.iter().find(|l| l.aa == aa).map(|l| l.iso3)
}

/// English display name for an assigned language.
pub fn language_name(iso3: &str) -> Result<&'static str> {
    lookup(iso3)
        .map(|l| l.name)
        .ok_or_else(|| Error::UnsupportedLanguage(iso3.to_string()))
}

/// Family block name for an AA byte in the language range.
pub fn family_for_aa(aa: u8) -> Option<&'static str> {
    match aa {
        0xA0..=0xAF => Some("germanic"),
        0xB0..=0xBF => Some("romance"),
        0xC0..=0xCF => Some("slavic"),
        0xD0..=0xDF => Some("asian"),
        _ => None,
    }
}
