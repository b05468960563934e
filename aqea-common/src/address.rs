//! AQEA 4-byte address codec
//!
//! An address is `AA:QQ:EE:A2`: language domain, universal part-of-speech,
//! semantic/frequency cluster, element ID. The canonical text form is
//! `0xAA:QQ:EE:A2` with uppercase hex digits, e.g. `0xA0:01:12:5B`.

use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::{Error, Result};

/// Natural-language AA domain range (inclusive).
pub const AA_LANGUAGE_MIN: u8 = 0xA0;
pub const AA_LANGUAGE_MAX: u8 = 0xDF;

/// Historical AA range, accepted on read only. New addresses never use it.
pub const AA_LEGACY_MIN: u8 = 0x20;
pub const AA_LEGACY_MAX: u8 = 0x2F;

/// Element IDs live in `[0x01, 0xFE]`; `0x00` and `0xFF` are reserved.
pub const A2_MIN: u8 = 0x01;
pub const A2_MAX: u8 = 0xFE;

/// A fully-resolved 4-byte AQEA address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AqeaAddress([u8; 4]);

impl AqeaAddress {
    /// Build an address from its four components, enforcing the byte
    /// discipline for freshly produced addresses (AA in the language range,
    /// EE not reserved, A2 in `[0x01, 0xFE]`).
    pub fn new(aa: u8, qq: u8, ee: u8, a2: u8) -> Result<Self> {
        if !(AA_LANGUAGE_MIN..=AA_LANGUAGE_MAX).contains(&aa) {
            return Err(Error::InvalidInput(format!(
                "AA byte 0x{aa:02X} outside language range 0xA0-0xDF"
            )));
        }
        if ee == 0x00 || ee == 0xFF {
            return Err(Error::InvalidInput(format!("reserved EE byte 0x{ee:02X}")));
        }
        if !(A2_MIN..=A2_MAX).contains(&a2) {
            return Err(Error::InvalidInput(format!("reserved A2 byte 0x{a2:02X}")));
        }
        Ok(Self([aa, qq, ee, a2]))
    }

    /// Build an address without range validation. Used when reading stored
    /// data that may carry legacy AA bytes.
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    pub fn aa(&self) -> u8 {
        self.0[0]
    }

    pub fn qq(&self) -> u8 {
        self.0[1]
    }

    pub fn ee(&self) -> u8 {
        self.0[2]
    }

    pub fn a2(&self) -> u8 {
        self.0[3]
    }

    pub fn bytes(&self) -> [u8; 4] {
        self.0
    }

    /// Whether the AA byte is in the historical `0x20-0x2F` range.
    pub fn is_legacy(&self) -> bool {
        (AA_LEGACY_MIN..=AA_LEGACY_MAX).contains(&self.0[0])
    }

    /// The `0xAA` domain string, as stored in the entry `domain` column.
    pub fn domain_string(&self) -> String {
        format!("0x{:02X}", self.0[0])
    }
}

impl fmt::Display for AqeaAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "0x{:02X}:{:02X}:{:02X}:{:02X}",
            self.0[0], self.0[1], self.0[2], self.0[3]
        )
    }
}

impl FromStr for AqeaAddress {
    type Err = Error;

    /// Parse the canonical form. The AA byte may fall in the legacy
    /// `0x20-0x2F` range; anything else outside `0xA0-0xDF` is rejected.
    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 4 {
            return Err(Error::InvalidInput(format!("malformed address '{s}'")));
        }
        let mut bytes = [0u8; 4];
        for (i, part) in parts.iter().enumerate() {
            let hex = part.strip_prefix("0x").unwrap_or(part);
            if hex.len() != 2 {
                return Err(Error::InvalidInput(format!("malformed address '{s}'")));
            }
            bytes[i] = u8::from_str_radix(hex, 16)
                .map_err(|_| Error::InvalidInput(format!("malformed address '{s}'")))?;
        }
        let aa = bytes[0];
        let language = (AA_LANGUAGE_MIN..=AA_LANGUAGE_MAX).contains(&aa);
        let legacy = (AA_LEGACY_MIN..=AA_LEGACY_MAX).contains(&aa);
        if !language && !legacy {
            return Err(Error::InvalidInput(format!(
                "AA byte 0x{aa:02X} outside accepted ranges"
            )));
        }
        Ok(Self(bytes))
    }
}

impl Serialize for AqeaAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AqeaAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// An address pattern fixing a prefix of the four bytes, e.g. `0xA0:01:*:*`.
/// A fixed byte must match exactly; `*` matches anything. Wildcards may only
/// trail fixed bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressPattern {
    components: [Option<u8>; 4],
}

impl AddressPattern {
    pub fn matches(&self, address: &AqeaAddress) -> bool {
        self.components
            .iter()
            .zip(address.bytes())
            .all(|(pat, byte)| pat.map_or(true, |p| p == byte))
    }

    /// The fixed leading bytes, used by SQL backends to build a LIKE prefix.
    pub fn fixed_prefix(&self) -> Vec<u8> {
        self.components.iter().map_while(|c| *c).collect()
    }
}

impl FromStr for AddressPattern {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 4 {
            return Err(Error::InvalidInput(format!("malformed pattern '{s}'")));
        }
        let mut components = [None; 4];
        let mut wildcard_seen = false;
        for (i, part) in parts.iter().enumerate() {
            if *part == "*" {
                wildcard_seen = true;
                continue;
            }
            if wildcard_seen {
                return Err(Error::InvalidInput(format!(
                    "pattern '{s}' fixes a byte after a wildcard"
                )));
            }
            let hex = part.strip_prefix("0x").unwrap_or(part);
            components[i] = Some(
                u8::from_str_radix(hex, 16)
                    .map_err(|_| Error::InvalidInput(format!("malformed pattern '{s}'")))?,
            );
        }
        Ok(Self { components })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_canonical_form() {
        let addr = AqeaAddress::new(0xA0, 0x01, 0x12, 0x5B).unwrap();
        assert_eq!(addr.to_string(), "0xA0:01:12:5B");
        let parsed: AqeaAddress = "0xA0:01:12:5B".parse().unwrap();
        assert_eq!(parsed, addr);
    }

    #[test]
    fn new_rejects_reserved_bytes() {
        assert!(AqeaAddress::new(0xA0, 0x01, 0x00, 0x10).is_err());
        assert!(AqeaAddress::new(0xA0, 0x01, 0xFF, 0x10).is_err());
        assert!(AqeaAddress::new(0xA0, 0x01, 0x12, 0x00).is_err());
        assert!(AqeaAddress::new(0xA0, 0x01, 0x12, 0xFF).is_err());
    }

    #[test]
    fn new_rejects_legacy_domain() {
        assert!(AqeaAddress::new(0x20, 0x01, 0x12, 0x10).is_err());
    }

    #[test]
    fn parse_accepts_legacy_domain() {
        let addr: AqeaAddress = "0x2A:01:12:10".parse().unwrap();
        assert!(addr.is_legacy());
    }

    #[test]
    fn parse_rejects_unassigned_domain() {
        assert!("0x10:01:12:10".parse::<AqeaAddress>().is_err());
        assert!("0xE0:01:12:10".parse::<AqeaAddress>().is_err());
    }

    #[test]
    fn pattern_matches_prefix() {
        let pattern: AddressPattern = "0xA0:01:*:*".parse().unwrap();
        let hit = AqeaAddress::new(0xA0, 0x01, 0x12, 0x5B).unwrap();
        let miss = AqeaAddress::new(0xA0, 0x02, 0x12, 0x5B).unwrap();
        assert!(pattern.matches(&hit));
        assert!(!pattern.matches(&miss));
        assert_eq!(pattern.fixed_prefix(), vec![0xA0, 0x01]);
    }

    #[test]
    fn pattern_rejects_fixed_after_wildcard() {
        assert!("0xA0:*:01:*".parse::<AddressPattern>().is_err());
    }

    #[test]
    fn serde_uses_string_form() {
        let addr = AqeaAddress::new(0xB1, 0x02, 0x21, 0x07).unwrap();
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, "\"0xB1:02:21:07\"");
        let back: AqeaAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }
}
