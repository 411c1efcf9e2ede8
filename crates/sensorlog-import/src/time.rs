//! Timestamp parsing for logger exports.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone as _};

/// Formats seen in logger exports, tried in order. Naive values are read as
/// local time, the way the logging host wrote them.
const NAIVE_FORMATS: &[&str] = &[
  "%m/%d/%y %I:%M:%S %p",
  "%m/%d/%Y %I:%M:%S %p",
  "%m/%d/%y %H:%M:%S",
  "%m/%d/%Y %H:%M:%S",
  "%Y-%m-%d %H:%M:%S",
  "%Y-%m-%d %H:%M:%S%.f",
  "%Y-%m-%dT%H:%M:%S",
  "%Y-%m-%dT%H:%M:%S%.f",
];

/// Parse Unix seconds (`"1400000000.25"`).
pub fn parse_unix(raw: &str) -> Option<f64> {
  raw.trim().parse::<f64>().ok().filter(|t| t.is_finite())
}

/// Parse a date-time string into Unix seconds. RFC 3339 values keep their
/// offset; anything else is tried against the known naive formats.
pub fn parse_datetime(raw: &str) -> Option<f64> {
  let raw = raw.trim();
  if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
    return Some(to_seconds(dt.timestamp(), dt.timestamp_subsec_micros()));
  }

  let naive = NAIVE_FORMATS
    .iter()
    .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())?;
  local_seconds(naive)
}

pub fn local_seconds(naive: NaiveDateTime) -> Option<f64> {
  let dt = Local.from_local_datetime(&naive).earliest()?;
  Some(to_seconds(dt.timestamp(), dt.timestamp_subsec_micros()))
}

fn to_seconds(secs: i64, micros: u32) -> f64 { secs as f64 + f64::from(micros) / 1_000_000.0 }
