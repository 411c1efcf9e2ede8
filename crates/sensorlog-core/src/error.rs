//! Error types for `sensorlog-core`.

use thiserror::Error;

use crate::category::Category;

#[derive(Debug, Error)]
pub enum Error {
  /// A name that must be present for this kind of write was blank.
  #[error("missing required {0} name")]
  MissingName(Category),

  #[error("unknown category: {0:?}")]
  UnknownCategory(String),

  #[error("invalid timestamp: {0}")]
  InvalidTimestamp(f64),

  #[error("invalid value: {0}")]
  InvalidValue(f64),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
