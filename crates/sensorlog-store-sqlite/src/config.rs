//! Store configuration, deserialised from the `[store]` table of the
//! application config.

use std::{path::PathBuf, time::Duration};

use serde::Deserialize;

/// How the point-in-time resolver picks "the latest transition before T".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextOrdering {
  /// Greatest recorded timestamp; ties go to the later insertion.
  #[default]
  Timestamp,
  /// Latest insertion among rows with an earlier timestamp, regardless of
  /// how their timestamps compare to each other.
  Arrival,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
  /// SQLite database file.
  pub path:             PathBuf,
  /// JSON-lines file receiving writes that exhausted their retries.
  pub fallback_log:     PathBuf,
  /// Attempts per write before spilling, including the first.
  pub max_attempts:     u32,
  pub retry_delay_ms:   u64,
  /// SQLite's own lock wait per attempt. Zero surfaces contention at once
  /// and leaves the waiting to the retry loop.
  pub busy_timeout_ms:  u64,
  /// Successful writes between forced commits.
  pub commit_interval:  u64,
  pub context_ordering: ContextOrdering,
}

impl Default for StoreConfig {
  fn default() -> Self {
    Self {
      path:             PathBuf::from("observations.db"),
      fallback_log:     PathBuf::from("observations.fallback.jsonl"),
      max_attempts:     10,
      retry_delay_ms:   100,
      busy_timeout_ms:  0,
      commit_interval:  1000,
      context_ordering: ContextOrdering::Timestamp,
    }
  }
}

impl StoreConfig {
  pub fn retry_delay(&self) -> Duration { Duration::from_millis(self.retry_delay_ms) }

  pub fn busy_timeout(&self) -> Duration { Duration::from_millis(self.busy_timeout_ms) }
}
