//! Timestamp helpers for outbound messages.
//!
//! The meeting service expects RFC 3339 timestamps in UTC with millisecond
//! precision and a `Z` suffix, e.g. `2026-10-19T08:30:00.000Z`.

use chrono::{DateTime, SecondsFormat, Utc};

/// Formats a UTC datetime the way the meeting service expects it.
pub fn wire_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Returns the current time formatted with [`wire_timestamp`].
pub fn now_timestamp() -> String {
    wire_timestamp(Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn wire_timestamp_format() {
        let at = Utc.with_ymd_and_hms(2026, 10, 19, 8, 30, 0).unwrap();
        assert_eq!(wire_timestamp(at), "2026-10-19T08:30:00.000Z");
    }

    #[test]
    fn now_timestamp_parses_back() {
        let ts = now_timestamp();
        assert!(ts.ends_with('Z'));
        assert!(DateTime::parse_from_rfc3339(&ts).is_ok());
    }
}
