//! The `ObservationStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g.
//! `sensorlog-store-sqlite`). Ingestion and export layers (`sensorlog-api`,
//! `sensorlog-import`, the CLI) depend on this abstraction, not on any
//! concrete backend.

use std::future::Future;

use serde::Deserialize;

use crate::{
  Category,
  observation::{
    Context, LocationRow, NameRecord, NewLocationEntry, NewObservation,
    ObservationRow, WriteOutcome,
  },
};

// ─── Query types ─────────────────────────────────────────────────────────────

/// Filter for [`ObservationStore::observations`]. Bounds are inclusive.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ObservationQuery {
  pub since:  Option<f64>,
  pub until:  Option<f64>,
  /// Restrict to one source name.
  pub source: Option<String>,
  pub limit:  Option<usize>,
  pub offset: Option<usize>,
}

/// Filter for [`ObservationStore::location_history`]. Bounds are inclusive.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryQuery {
  pub since: Option<f64>,
  pub until: Option<f64>,
  pub limit: Option<usize>,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over an observation store backend.
///
/// Observations and location transitions are append-only. Callers speak in
/// names; the backend maps them to stable ids internally.
///
/// Writes never fail on storage contention: they either land in the store
/// or are spilled to a fallback log, reported through [`WriteOutcome`].
pub trait ObservationStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Record one sensor reading. The timestamp defaults to now.
  fn record(
    &self,
    input: NewObservation,
  ) -> impl Future<Output = Result<WriteOutcome, Self::Error>> + Send + '_;

  /// Record a location/position/status transition. The timestamp defaults
  /// to now.
  fn record_location(
    &self,
    input: NewLocationEntry,
  ) -> impl Future<Output = Result<WriteOutcome, Self::Error>> + Send + '_;

  /// The context recorded most recently strictly before `timestamp`, or
  /// `None` if there is no earlier transition.
  fn resolve_context(
    &self,
    timestamp: f64,
  ) -> impl Future<Output = Result<Option<Context>, Self::Error>> + Send + '_;

  /// Observations joined against the name tables, ordered by timestamp.
  fn observations<'a>(
    &'a self,
    query: &'a ObservationQuery,
  ) -> impl Future<Output = Result<Vec<ObservationRow>, Self::Error>> + Send + 'a;

  /// Location transitions joined against the name tables, in timestamp
  /// order.
  fn location_history<'a>(
    &'a self,
    query: &'a HistoryQuery,
  ) -> impl Future<Output = Result<Vec<LocationRow>, Self::Error>> + Send + 'a;

  /// Every name registered in `category`, ordered by id.
  fn names(
    &self,
    category: Category,
  ) -> impl Future<Output = Result<Vec<NameRecord>, Self::Error>> + Send + '_;

  /// Commit any batched writes now.
  fn flush(&self) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}
