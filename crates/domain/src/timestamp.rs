//! Packet timestamps: ISO-8601 UTC with seven fractional digits, e.g.
//! `2024-03-01T12:30:45.1234567Z`.

use chrono::{DateTime, SecondsFormat, Timelike, Utc};

/// Format a UTC instant the way the service expects packet timestamps.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    // chrono only offers 3/6/9 fixed fractional digits; the wire uses 100ns ticks.
    let ticks = at.nanosecond() % 1_000_000_000 / 100;
    format!("{}.{:07}Z", at.format("%Y-%m-%dT%H:%M:%S"), ticks)
}

/// Current time as a packet timestamp.
pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

/// Parse a packet timestamp. Accepts any RFC 3339 precision.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}

/// RFC 3339 with millisecond precision, used for token expiry comparisons in logs.
pub fn format_millis(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
