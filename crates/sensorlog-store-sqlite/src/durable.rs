//! Retry-with-backoff around every mutating statement, batched commits, and
//! the spill path to the fallback log.

use std::{thread, time::Duration};

use rusqlite::{Connection, ErrorCode, types::Value};
use sensorlog_core::observation::{WriteOutcome, now};
use serde::Serialize;

use crate::{
  Error, Result, StoreConfig,
  fallback::{FallbackLog, NameRef, SpilledWrite},
};

/// A mutating statement with its bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
  pub sql:      String,
  pub params:   Vec<Value>,
  /// Names that must exist before this statement can succeed.
  pub requires: Vec<NameRef>,
}

impl Statement {
  pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
    Self { sql: sql.into(), params, requires: vec![] }
  }

  pub fn requiring(mut self, requires: Vec<NameRef>) -> Self {
    self.requires = requires;
    self
  }
}

/// Counters exposed for monitoring and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriterStats {
  /// Successful writes since the last commit.
  pub pending:     u64,
  /// Commits forced by reaching the commit interval.
  pub checkpoints: u64,
  pub spilled:     u64,
}

/// True for the lock-contention failures worth retrying.
pub fn is_busy(err: &rusqlite::Error) -> bool {
  matches!(
    err,
    rusqlite::Error::SqliteFailure(e, _)
      if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
  )
}

pub struct DurableWriter {
  max_attempts:    u32,
  delay:           Duration,
  commit_interval: u64,
  log:             FallbackLog,
  stats:           WriterStats,
  held:            bool,
}

impl DurableWriter {
  pub fn new(config: &StoreConfig) -> Self {
    Self {
      max_attempts:    config.max_attempts.max(1),
      delay:           config.retry_delay(),
      commit_interval: config.commit_interval.max(1),
      log:             FallbackLog::new(&config.fallback_log),
      stats:           WriterStats::default(),
      held:            false,
    }
  }

  pub fn stats(&self) -> WriterStats { self.stats }

  pub fn max_attempts(&self) -> u32 { self.max_attempts }

  pub fn log(&self) -> &FallbackLog { &self.log }

  /// While held, reaching the commit interval does not commit; the batch
  /// stays open until an explicit [`commit`](Self::commit).
  pub fn hold_checkpoints(&mut self, hold: bool) { self.held = hold; }

  /// Run `op` until it succeeds, fails with a non-busy error, or the
  /// attempt budget runs out (`Ok(None)`).
  pub fn retry<T>(
    &self,
    what: &str,
    mut op: impl FnMut() -> rusqlite::Result<T>,
  ) -> Result<Option<T>> {
    for attempt in 1..=self.max_attempts {
      match op() {
        Ok(v) => return Ok(Some(v)),
        Err(e) if is_busy(&e) => {
          tracing::warn!(what, attempt, max = self.max_attempts, "database busy, trying again");
          if attempt < self.max_attempts {
            thread::sleep(self.delay);
          }
        }
        Err(e) => return Err(e.into()),
      }
    }
    Ok(None)
  }

  /// Like [`retry`](Self::retry), but exhaustion is an error.
  pub fn retry_or_busy<T>(
    &self,
    what: &str,
    op: impl FnMut() -> rusqlite::Result<T>,
  ) -> Result<T> {
    self
      .retry(what, op)?
      .ok_or(Error::Busy { attempts: self.max_attempts })
  }

  /// Execute `stmt` inside the current batch, retrying on contention.
  /// Returns `Ok(None)` when retries are exhausted; nothing is spilled.
  pub fn write(&mut self, conn: &Connection, stmt: &Statement) -> Result<Option<usize>> {
    let changed = self.retry(&stmt.sql, || {
      if conn.is_autocommit() {
        conn.execute_batch("BEGIN IMMEDIATE")?;
      }
      conn.execute(&stmt.sql, rusqlite::params_from_iter(stmt.params.iter()))
    })?;

    if changed.is_some() {
      self.stats.pending += 1;
      self.check_auto_commit(conn)?;
    }
    Ok(changed)
  }

  /// Execute `stmt`, spilling it to the fallback log if contention outlasts
  /// the retry budget.
  pub fn execute(&mut self, conn: &Connection, stmt: &Statement) -> Result<WriteOutcome> {
    match self.write(conn, stmt)? {
      Some(_) => Ok(WriteOutcome::Written),
      None => {
        self.spill(stmt)?;
        Ok(WriteOutcome::Spilled)
      }
    }
  }

  pub fn spill(&mut self, stmt: &Statement) -> Result<()> {
    self.log.append(&SpilledWrite::from_statement(stmt, now()))?;
    self.stats.spilled += 1;
    tracing::warn!(
      sql = %stmt.sql,
      log = %self.log.path().display(),
      "retries exhausted; write spilled to fallback log"
    );
    Ok(())
  }

  /// Commit the open batch, if any, and reset the pending counter.
  pub fn commit(&mut self, conn: &Connection) -> Result<()> {
    if !conn.is_autocommit() {
      self.retry_or_busy("COMMIT", || conn.execute_batch("COMMIT"))?;
    }
    self.stats.pending = 0;
    Ok(())
  }

  /// Discard the open batch, if any.
  pub fn rollback(&mut self, conn: &Connection) -> Result<()> {
    if !conn.is_autocommit() {
      conn.execute_batch("ROLLBACK")?;
    }
    self.stats.pending = 0;
    Ok(())
  }

  fn check_auto_commit(&mut self, conn: &Connection) -> Result<()> {
    if self.held || self.stats.pending < self.commit_interval {
      return Ok(());
    }
    let pending = self.stats.pending;
    match self.commit(conn) {
      Ok(()) => {
        self.stats.checkpoints += 1;
        tracing::info!(inserts = pending, "forcing commit");
        Ok(())
      }
      // The batch stays open; the next write tries the checkpoint again.
      Err(e) if e.is_busy() => {
        tracing::warn!(inserts = pending, "checkpoint deferred, database busy");
        Ok(())
      }
      Err(e) => Err(e),
    }
  }
}
