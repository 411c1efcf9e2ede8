//! Error type for `sensorlog-store-sqlite`.

use std::path::PathBuf;

use sensorlog_core::Category;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] sensorlog_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  /// Retries were exhausted on an operation that cannot be spilled.
  #[error("database still busy after {attempts} attempts")]
  Busy { attempts: u32 },

  /// Appending to (or rewriting) the fallback log failed. Data may be lost.
  #[error("fallback log {path:?}: {source}")]
  FallbackLog {
    path:   PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("no {category} with id {id}")]
  UnknownId { category: Category, id: i64 },

  #[error("malformed fallback entry on line {line}: {reason}")]
  MalformedSpill { line: usize, reason: String },

  #[error("writer state poisoned by an earlier panic")]
  StatePoisoned,
}

impl Error {
  pub fn is_busy(&self) -> bool { matches!(self, Self::Busy { .. }) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
