//! Observations, location-history transitions and the rows read back out.
//!
//! Timestamps are Unix seconds as `f64`, matching what the sensor readers
//! and CSV loggers produce. Names are plain strings; integer ids never leave
//! the storage backend.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{Category, Error, Result};

/// Seconds since the Unix epoch, with microsecond precision.
pub fn now() -> f64 { Utc::now().timestamp_micros() as f64 / 1_000_000.0 }

/// Treat blank strings as absent.
fn non_blank(name: Option<String>) -> Option<String> {
  name.filter(|n| !n.trim().is_empty())
}

fn check_timestamp(ts: Option<f64>) -> Result<()> {
  match ts {
    Some(t) if !t.is_finite() => Err(Error::InvalidTimestamp(t)),
    _ => Ok(()),
  }
}

// ─── Writes ──────────────────────────────────────────────────────────────────

/// Input to [`ObservationStore::record`](crate::store::ObservationStore::record).
///
/// Only `source` and `value` are required; the context names and notes are
/// optional and stored as NULL when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewObservation {
  pub source:    String,
  pub value:     f64,
  pub location:  Option<String>,
  pub position:  Option<String>,
  pub status:    Option<String>,
  /// Defaults to the time of recording when `None`.
  pub timestamp: Option<f64>,
  pub notes:     Option<String>,
}

impl NewObservation {
  pub fn new(source: impl Into<String>, value: f64) -> Self {
    Self {
      source: source.into(),
      value,
      location: None,
      position: None,
      status: None,
      timestamp: None,
      notes: None,
    }
  }

  pub fn at(mut self, timestamp: f64) -> Self {
    self.timestamp = Some(timestamp);
    self
  }

  pub fn location(mut self, name: impl Into<String>) -> Self {
    self.location = Some(name.into());
    self
  }

  pub fn position(mut self, name: impl Into<String>) -> Self {
    self.position = Some(name.into());
    self
  }

  pub fn status(mut self, name: impl Into<String>) -> Self {
    self.status = Some(name.into());
    self
  }

  pub fn notes(mut self, notes: impl Into<String>) -> Self {
    self.notes = Some(notes.into());
    self
  }

  /// Attach a resolved point-in-time context.
  pub fn with_context(mut self, ctx: Context) -> Self {
    self.location = Some(ctx.location);
    self.position = Some(ctx.position);
    self.status = Some(ctx.status);
    self
  }

  /// Blank optional fields become `None`; a blank source or a non-finite
  /// value is rejected.
  pub fn normalized(self) -> Result<Self> {
    if self.source.trim().is_empty() {
      return Err(Error::MissingName(Category::Source));
    }
    if !self.value.is_finite() {
      return Err(Error::InvalidValue(self.value));
    }
    check_timestamp(self.timestamp)?;
    Ok(Self {
      location: non_blank(self.location),
      position: non_blank(self.position),
      status: non_blank(self.status),
      notes: non_blank(self.notes),
      ..self
    })
  }

  /// The optional context names paired with their categories.
  pub fn context_names(&self) -> [(Category, Option<&str>); 3] {
    [
      (Category::Location, self.location.as_deref()),
      (Category::Position, self.position.as_deref()),
      (Category::Status, self.status.as_deref()),
    ]
  }
}

/// Input to
/// [`ObservationStore::record_location`](crate::store::ObservationStore::record_location).
/// All three names are required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLocationEntry {
  pub location:  String,
  pub position:  String,
  pub status:    String,
  pub timestamp: Option<f64>,
}

impl NewLocationEntry {
  pub fn new(
    location: impl Into<String>,
    position: impl Into<String>,
    status: impl Into<String>,
  ) -> Self {
    Self {
      location:  location.into(),
      position:  position.into(),
      status:    status.into(),
      timestamp: None,
    }
  }

  pub fn at(mut self, timestamp: f64) -> Self {
    self.timestamp = Some(timestamp);
    self
  }

  pub fn names(&self) -> [(Category, &str); 3] {
    [
      (Category::Location, self.location.as_str()),
      (Category::Position, self.position.as_str()),
      (Category::Status, self.status.as_str()),
    ]
  }

  pub fn validate(&self) -> Result<()> {
    for (category, name) in self.names() {
      if name.trim().is_empty() {
        return Err(Error::MissingName(category));
      }
    }
    check_timestamp(self.timestamp)
  }
}

/// Whether a write reached the store or was diverted to the fallback log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOutcome {
  Written,
  /// Retries were exhausted; the statement is in the fallback log awaiting
  /// replay.
  Spilled,
}

impl WriteOutcome {
  pub fn is_written(self) -> bool { matches!(self, Self::Written) }
}

// ─── Reads ───────────────────────────────────────────────────────────────────

/// The location/position/status triple in effect at some instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
  pub location: String,
  pub position: String,
  pub status:   String,
}

/// A `(id, name)` pair from one of the category tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameRecord {
  pub id:   i64,
  pub name: String,
}

/// One observation with every id replaced by its name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRow {
  pub timestamp: f64,
  pub source:    String,
  pub location:  Option<String>,
  pub position:  Option<String>,
  pub status:    Option<String>,
  pub value:     f64,
  pub notes:     Option<String>,
}

/// One location-history transition with names resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRow {
  /// Insertion order; strictly increasing.
  pub seq:       i64,
  pub timestamp: f64,
  pub location:  String,
  pub position:  String,
  pub status:    String,
}

impl LocationRow {
  pub fn context(&self) -> Context {
    Context {
      location: self.location.clone(),
      position: self.position.clone(),
      status:   self.status.clone(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn blank_optional_names_become_none() {
    let obs = NewObservation::new("dylos", 3.0)
      .location("  ")
      .position("seat")
      .notes("")
      .normalized()
      .unwrap();
    assert_eq!(obs.location, None);
    assert_eq!(obs.position.as_deref(), Some("seat"));
    assert_eq!(obs.notes, None);
  }

  #[test]
  fn blank_source_is_rejected() {
    let err = NewObservation::new(" ", 1.0).normalized().unwrap_err();
    assert!(matches!(err, Error::MissingName(Category::Source)));
  }

  #[test]
  fn location_entry_requires_every_name() {
    let err = NewLocationEntry::new("copley", "", "stopped")
      .validate()
      .unwrap_err();
    assert!(matches!(err, Error::MissingName(Category::Position)));
    assert!(NewLocationEntry::new("copley", "car 3", "stopped").validate().is_ok());
  }

  #[test]
  fn non_finite_timestamp_is_rejected() {
    let err = NewObservation::new("dylos", 1.0)
      .at(f64::NAN)
      .normalized()
      .unwrap_err();
    assert!(matches!(err, Error::InvalidTimestamp(_)));
  }

  #[test]
  fn non_finite_value_is_rejected() {
    for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
      let err = NewObservation::new("dylos", value).normalized().unwrap_err();
      assert!(matches!(err, Error::InvalidValue(_)));
    }
    assert!(NewObservation::new("dylos", -0.5).normalized().is_ok());
  }
}
