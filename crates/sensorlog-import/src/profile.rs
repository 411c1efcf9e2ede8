//! Column maps for the loggers whose CSV exports are imported.

use std::fmt;

/// How a CSV header is recognised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnMatch {
  Exact(String),
  /// The header starts with this text. HOBO headers end in the logger's
  /// serial number, which differs per device.
  Prefix(String),
  Contains(String),
}

impl ColumnMatch {
  pub fn matches(&self, header: &str) -> bool {
    let header = header.trim();
    match self {
      Self::Exact(s) => header == s,
      Self::Prefix(s) => header.starts_with(s.as_str()),
      Self::Contains(s) => header.contains(s.as_str()),
    }
  }

  /// Index of the first matching header.
  pub fn find(&self, headers: &csv::StringRecord) -> Option<usize> {
    headers.iter().position(|h| self.matches(h))
  }
}

impl fmt::Display for ColumnMatch {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Exact(s) => write!(f, "{s:?}"),
      Self::Prefix(s) => write!(f, "{s:?}*"),
      Self::Contains(s) => write!(f, "*{s:?}*"),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampFormat {
  UnixSeconds,
  DateTime,
}

impl TimestampFormat {
  pub fn parse(self, raw: &str) -> Option<f64> {
    match self {
      Self::UnixSeconds => crate::time::parse_unix(raw),
      Self::DateTime => crate::time::parse_datetime(raw),
    }
  }
}

/// Which CSV columns become which sources, and how to read the timestamp.
#[derive(Debug, Clone)]
pub struct ImportProfile {
  pub name:             String,
  /// Lines before the CSV header row.
  pub skip_lines:       usize,
  pub timestamp_column: ColumnMatch,
  pub timestamp_format: TimestampFormat,
  /// `(column, source name)` pairs.
  pub columns:          Vec<(ColumnMatch, String)>,
}

impl ImportProfile {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name:             name.into(),
      skip_lines:       0,
      timestamp_column: ColumnMatch::Exact("TIME".into()),
      timestamp_format: TimestampFormat::UnixSeconds,
      columns:          vec![],
    }
  }

  /// Map an exactly-named column to `source`.
  pub fn column(mut self, header: &str, source: &str) -> Self {
    self.columns.push((ColumnMatch::Exact(header.into()), source.into()));
    self
  }

  pub fn column_prefix(mut self, prefix: &str, source: &str) -> Self {
    self.columns.push((ColumnMatch::Prefix(prefix.into()), source.into()));
    self
  }

  pub fn timestamp(mut self, column: ColumnMatch, format: TimestampFormat) -> Self {
    self.timestamp_column = column;
    self.timestamp_format = format;
    self
  }

  pub fn skip_lines(mut self, n: usize) -> Self {
    self.skip_lines = n;
    self
  }

  /// Dylos DC1100 particle counter, as written by the serial reader.
  pub fn dylos() -> Self {
    Self::new("dylos")
      .column("SMALLPARTICLES", "dylos smallparticles")
      .column("LARGEPARTICLES", "dylos largeparticles")
  }

  /// ADXL345 accelerometer raw axes.
  pub fn adxl345() -> Self {
    Self::new("adxl345")
      .column("X", "adxl345 x axis raw")
      .column("Y", "adxl345 y axis raw")
      .column("Z", "adxl345 z axis raw")
  }

  /// Onset HOBO U12 logger export: a title line, then a header whose
  /// timestamp column contains "Date Time".
  pub fn hobo_u12() -> Self {
    Self::new("hobo-u12")
      .skip_lines(1)
      .timestamp(ColumnMatch::Contains("Date Time".into()), TimestampFormat::DateTime)
      .column_prefix("Temp, °F", "hobo temp fahrenheit")
      .column_prefix("RH, %", "hobo relative humidity")
      .column_prefix("Intensity, lum/ft²", "hobo light intensity lum ft2")
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn hobo_headers_match_regardless_of_serial() {
    let headers = csv::StringRecord::from(vec![
      "#",
      "Date Time, GMT-04:00",
      "Temp, °F (LGR S/N: 20311528, SEN S/N: 20311528)",
      "RH, % (LGR S/N: 99999999, SEN S/N: 99999999)",
    ]);
    let profile = ImportProfile::hobo_u12();
    assert_eq!(profile.timestamp_column.find(&headers), Some(1));
    assert_eq!(profile.columns[0].0.find(&headers), Some(2));
    assert_eq!(profile.columns[1].0.find(&headers), Some(3));
    assert_eq!(profile.columns[2].0.find(&headers), None);
  }

  #[test]
  fn exact_match_ignores_surrounding_space() {
    assert!(ColumnMatch::Exact("X".into()).matches(" X "));
    assert!(!ColumnMatch::Exact("X".into()).matches("XX"));
  }
}
