//! Wikitext parsing into raw records
//!
//! The German Wiktionary uses `{{Wortart|...}}` / `{{Bedeutungen}}`
//! templates; other editions use `===Noun===`-style section headers and
//! `#`-prefixed definition lines. Both are reduced to the same `RawRecord`
//! shape with wiki markup stripped.

use once_cell::sync::Lazy;
use regex::Regex;

use aqea_common::model::RawRecord;

static TITLE_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-ZÀ-ÿĀ-žА-яäöüÄÖÜß\s\-']+$").unwrap());
static TITLE_FORBIDDEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[/\[\]{}]").unwrap());

static GERMAN_POS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{Wortart\|([^|{}]+)").unwrap());
static GERMAN_IPA: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{Lautschrift\|([^}|]+)").unwrap());
static GENERIC_IPA: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{IPA\|[^}]*?\|([^}|]+)").unwrap());
static GENERIC_AUDIO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\{\{audio\|[^}]*?\|([^}|]+)").unwrap());
static GENERIC_DEFINITION: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^#\s*([^#*:\n][^\n]*)").unwrap());
static GENERIC_POS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)===\s*(Noun|Proper noun|Verb|Adjective|Adverb|Preposition|Pronoun|Determiner|Article|Conjunction|Numeral|Interjection|Particle)\s*===").unwrap()
});

static LINK_MARKUP: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\[(?:[^|\]]+\|)?([^\]]+)\]\]").unwrap());
static TEMPLATE_MARKUP: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{[^}]*\}\}").unwrap());
static TAG_MARKUP: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Screen a page title before spending a fetch on it: bounded length, no
/// namespaces, no parentheticals, not purely numeric, plausible word
/// characters only.
pub fn is_valid_entry_title(title: &str) -> bool {
    if title.is_empty() || title.chars().count() > 50 {
        return false;
    }
    if title.contains(':') || title.contains(" (") {
        return false;
    }
    if title.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    if TITLE_FORBIDDEN.is_match(title) {
        return false;
    }
    TITLE_CHARS.is_match(title)
}

/// Parse one page into a record, or `None` when the page carries nothing
/// usable (no definitions and no part of speech).
pub fn parse_wikitext(title: &str, wikitext: &str, language: &str) -> Option<RawRecord> {
    let record = RawRecord {
        word: title.to_string(),
        language: language.to_string(),
        ..RawRecord::default()
    };
    if language == "deu" {
        parse_german(record, wikitext)
    } else {
        parse_generic(record, wikitext)
    }
}

fn map_german_pos(pos: &str) -> &'static str {
    match pos {
        "Substantiv" => "noun",
        "Verb" => "verb",
        "Adjektiv" => "adjective",
        "Adverb" => "adverb",
        "Pronomen" => "pronoun",
        "Präposition" => "preposition",
        "Konjunktion" => "conjunction",
        "Artikel" => "determiner",
        "Numerale" => "numeral",
        "Interjektion" => "interjection",
        "Eigenname" => "proper_noun",
        "Hilfsverb" => "auxiliary",
        "Partikel" => "particle",
        _ => "unknown",
    }
}

fn parse_german(mut record: RawRecord, wikitext: &str) -> Option<RawRecord> {
    if let Some(caps) = GERMAN_POS.captures(wikitext) {
        record.pos = Some(map_german_pos(caps[1].trim()).to_string());
    }
    if let Some(caps) = GERMAN_IPA.captures(wikitext) {
        record.ipa = Some(caps[1].trim().to_string());
    }

    // Definitions live between {{Bedeutungen}} and the next template block,
    // one per ':'-prefixed line.
    let mut in_definitions = false;
    for line in wikitext.lines() {
        if line.starts_with("{{Bedeutungen}}") {
            in_definitions = true;
            continue;
        }
        if in_definitions && line.starts_with("{{") && !line.starts_with("{{#") {
            in_definitions = false;
            continue;
        }
        if in_definitions {
            if let Some(rest) = line.trim().strip_prefix(':') {
                let definition = clean_definition(rest);
                if !definition.is_empty() {
                    record.definitions.push(definition);
                }
            }
        }
    }
    record.definitions.truncate(5);

    if record.definitions.is_empty() && record.pos.is_none() {
        return None;
    }
    Some(record)
}

fn parse_generic(mut record: RawRecord, wikitext: &str) -> Option<RawRecord> {
    if let Some(caps) = GENERIC_IPA.captures(wikitext) {
        record.ipa = Some(caps[1].trim().to_string());
    }
    if let Some(caps) = GENERIC_AUDIO.captures(wikitext) {
        record.audio.push(caps[1].trim().to_string());
    }
    if let Some(caps) = GENERIC_POS.captures(wikitext) {
        let pos = caps[1].to_lowercase().replace(' ', "_");
        record.pos = Some(if pos == "article" { "determiner".into() } else { pos });
    }
    record.definitions = GENERIC_DEFINITION
        .captures_iter(wikitext)
        .map(|caps| clean_definition(&caps[1]))
        .filter(|d| !d.is_empty())
        .take(5)
        .collect();

    if record.definitions.is_empty() && record.ipa.is_none() {
        return None;
    }
    Some(record)
}

/// Strip wiki link/template/tag markup and collapse whitespace.
fn clean_definition(definition: &str) -> String {
    let cleaned = LINK_MARKUP.replace_all(definition, "$1");
    let cleaned = TEMPLATE_MARKUP.replace_all(&cleaned, "");
    let cleaned = TAG_MARKUP.replace_all(&cleaned, "");
    WHITESPACE.replace_all(&cleaned, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_screening() {
        assert!(is_valid_entry_title("Apfel"));
        assert!(is_valid_entry_title("Fähre"));
        assert!(is_valid_entry_title("straßenbahn"));
        assert!(!is_valid_entry_title("Kategorie:Deutsch"));
        assert!(!is_valid_entry_title("Apfel (Begriffsklärung)"));
        assert!(!is_valid_entry_title("1234"));
        assert!(!is_valid_entry_title("foo/bar"));
        assert!(!is_valid_entry_title(""));
    }

    #[test]
    fn german_page_parses_pos_ipa_and_definitions() {
        let wikitext = "\
== Apfel ({{Sprache|Deutsch}}) ==\n\
=== {{Wortart|Substantiv|Deutsch}}, {{m}} ===\n\
{{Lautschrift|ˈap͡fl̩}}\n\
{{Bedeutungen}}\n\
:[1] rundliche [[Frucht]] des Apfelbaums\n\
:[2] {{ugs.|:}} der Apfelbaum selbst\n\
{{Herkunft}}\n\
:von mittelhochdeutsch apfel\n";
        let record = parse_wikitext("Apfel", wikitext, "deu").unwrap();
        assert_eq!(record.pos.as_deref(), Some("noun"));
        assert_eq!(record.ipa.as_deref(), Some("ˈap͡fl̩"));
        assert_eq!(record.definitions.len(), 2);
        assert_eq!(record.definitions[0], "[1] rundliche Frucht des Apfelbaums");
        // the {{Herkunft}} block is not part of the definitions
        assert!(!record.definitions.iter().any(|d| d.contains("mittelhochdeutsch")));
    }

    #[test]
    fn german_page_without_content_is_skipped() {
        assert!(parse_wikitext("Apfel", "just prose, no templates", "deu").is_none());
    }

    #[test]
    fn generic_page_parses_sections() {
        let wikitext = "\
==English==\n\
===Noun===\n\
{{IPA|en|/ˈwɔːtə/}}\n\
# a [[liquid|clear liquid]] essential to life\n\
# a body of water such as a {{l|en|lake}}\n";
        let record = parse_wikitext("water", wikitext, "eng").unwrap();
        assert_eq!(record.pos.as_deref(), Some("noun"));
        assert_eq!(record.ipa.as_deref(), Some("/ˈwɔːtə/"));
        assert_eq!(record.definitions[0], "a clear liquid essential to life");
    }

    #[test]
    fn generic_article_maps_to_determiner() {
        let wikitext = "===Article===\n# definite article\n";
        let record = parse_wikitext("the", wikitext, "eng").unwrap();
        assert_eq!(record.pos.as_deref(), Some("determiner"));
    }

    #[test]
    fn clean_definition_strips_markup() {
        assert_eq!(
            clean_definition("a [[liquid|clear liquid]] {{context|chemistry}} <i>essential</i>  to life"),
            "a clear liquid essential to life"
        );
    }
}
