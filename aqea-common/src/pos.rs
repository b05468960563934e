//! Universal part-of-speech table (QQ byte)

/// QQ byte for the unknown / unmapped part of speech.
pub const QQ_UNKNOWN: u8 = 0xFF;

const POS_TABLE: &[(&str, u8)] = &[
    ("noun", 0x01),
    ("verb", 0x02),
    ("adjective", 0x03),
    ("adverb", 0x04),
    ("preposition", 0x05),
    ("pronoun", 0x06),
    ("determiner", 0x07),
    ("conjunction", 0x08),
    ("numeral", 0x09),
    ("interjection", 0x0A),
    ("particle", 0x0B),
    ("proper_noun", 0x0C),
    ("auxiliary", 0x0D),
    ("classifier", 0x0E),
    ("copula", 0x0F),
];

/// Map a POS identifier to its QQ byte. Anything unrecognized maps to
/// `0xFF` (unknown); the input is lowercased first.
pub fn qq_for_pos(pos: &str) -> u8 {
    let pos = pos.trim().to_lowercase();
    POS_TABLE
        .iter()
        .find(|(name, _)| *name == pos)
        .map(|(_, qq)| *qq)
        .unwrap_or(QQ_UNKNOWN)
}

/// Reverse lookup; reserved QQ bytes resolve to nothing.
pub fn pos_for_qq(qq: u8) -> Option<&'static str> {
    if qq == QQ_UNKNOWN {
        return Some("unknown");
    }
    POS_TABLE
        .iter()
        .find(|(_, byte)| *byte == qq)
        .map(|(name, _)| *name)
}
