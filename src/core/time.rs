//! Shared timestamp and identifier helpers.
//!
//! Graph rows arrive from an external store and may encode instants in several
//! shapes; `parse_timestamp` accepts all of them so detectors never have to.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde_json::Value as JsonValue;
use ulid::Ulid;

pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

/// Sortable identifier with a kind prefix, e.g. `AUD-01J9...`.
pub fn new_prefixed_id(prefix: &str) -> String {
    format!("{}-{}", prefix, Ulid::new())
}

/// Fixed-width RFC 3339 rendering; lexicographic order equals time order.
pub fn to_storage_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses an instant from a graph row value.
///
/// Accepts RFC 3339 strings, naive ISO-8601 strings (read as UTC), epoch
/// seconds as a JSON number, and epoch strings with an optional `Z` suffix.
pub fn parse_timestamp(value: &JsonValue) -> Option<DateTime<Utc>> {
    match value {
        JsonValue::String(s) => parse_timestamp_str(s),
        JsonValue::Number(n) => {
            if let Some(secs) = n.as_i64() {
                Utc.timestamp_opt(secs, 0).single()
            } else {
                let f = n.as_f64()?;
                let secs = f.trunc() as i64;
                let nanos = ((f - f.trunc()) * 1e9) as u32;
                Utc.timestamp_opt(secs, nanos).single()
            }
        }
        _ => None,
    }
}

fn parse_timestamp_str(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    let epoch = s.strip_suffix('Z').unwrap_or(s);
    epoch
        .parse::<i64>()
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
}

/// Signed seconds from `earlier` to `later`, with sub-second precision.
pub fn seconds_between(later: &DateTime<Utc>, earlier: &DateTime<Utc>) -> f64 {
    (*later - *earlier).num_milliseconds() as f64 / 1000.0
}
