//! Timestamp helpers
//!
//! All persisted and wire-visible timestamps are RFC 3339 strings in UTC.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::{Error, Result};

/// Format a timestamp the way it appears in storage and on the wire.
pub fn to_rfc3339(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored RFC 3339 timestamp back into UTC.
pub fn parse_rfc3339(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::InvalidInput(format!("bad timestamp '{s}': {e}")))
}

/// Milliseconds since the Unix epoch, used in fallback file names.
pub fn unix_ms(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc3339_round_trip() {
        let now = Utc::now();
        let parsed = parse_rfc3339(&to_rfc3339(now)).unwrap();
        assert_eq!(parsed.timestamp_micros(), now.timestamp_micros());
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_rfc3339("yesterday").is_err());
    }
}
