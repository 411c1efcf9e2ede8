//! The fallback log: a JSON-lines side file holding writes that could not
//! be committed after retrying.
//!
//! Each line is one [`SpilledWrite`]. The file is readable by hand and is
//! replayed by [`SqliteStore::replay_fallback`](crate::SqliteStore::replay_fallback).

use std::{
  fs::{self, OpenOptions},
  io::{BufRead as _, BufReader, Write as _},
  path::{Path, PathBuf},
};

use rusqlite::types::Value;
use sensorlog_core::Category;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::{Error, Result, durable::Statement};

/// A name that must be registered before the statement can run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameRef {
  pub category: Category,
  pub name:     String,
}

/// One line of the fallback log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpilledWrite {
  /// Unix seconds at which the write was given up on.
  pub spilled_at: f64,
  pub sql:        String,
  pub params:     Vec<Json>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub requires:   Vec<NameRef>,
}

impl SpilledWrite {
  pub fn from_statement(stmt: &Statement, spilled_at: f64) -> Self {
    Self {
      spilled_at,
      sql: stmt.sql.clone(),
      params: stmt.params.iter().map(value_to_json).collect(),
      requires: stmt.requires.clone(),
    }
  }

  pub fn to_statement(&self) -> Statement {
    Statement {
      sql:      self.sql.clone(),
      params:   self.params.iter().map(json_to_value).collect(),
      requires: self.requires.clone(),
    }
  }
}

/// Outcome of a replay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
  pub replayed:  usize,
  /// Entries still in the log: contention again, or a hard failure.
  pub remaining: usize,
}

// ─── Parameter encoding ──────────────────────────────────────────────────────

fn value_to_json(v: &Value) -> Json {
  match v {
    Value::Null => Json::Null,
    Value::Integer(i) => Json::from(*i),
    Value::Real(f) => Json::from(*f),
    Value::Text(s) => Json::from(s.as_str()),
    Value::Blob(b) => Json::from(b.clone()),
  }
}

fn json_to_value(j: &Json) -> Value {
  match j {
    Json::Null => Value::Null,
    Json::Bool(b) => Value::Integer(i64::from(*b)),
    Json::Number(n) => match n.as_i64() {
      Some(i) => Value::Integer(i),
      None => Value::Real(n.as_f64().unwrap_or(f64::NAN)),
    },
    Json::String(s) => Value::Text(s.clone()),
    Json::Array(items) => Value::Blob(
      items
        .iter()
        .filter_map(|i| i.as_u64().and_then(|b| u8::try_from(b).ok()))
        .collect(),
    ),
    Json::Object(_) => Value::Text(j.to_string()),
  }
}

// ─── File ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct FallbackLog {
  path: PathBuf,
}

impl FallbackLog {
  pub fn new(path: impl Into<PathBuf>) -> Self { Self { path: path.into() } }

  pub fn path(&self) -> &Path { &self.path }

  fn io_err(&self, source: std::io::Error) -> Error {
    Error::FallbackLog { path: self.path.clone(), source }
  }

  /// Append one entry and sync it to disk before returning.
  pub fn append(&self, entry: &SpilledWrite) -> Result<()> {
    let mut line = serde_json::to_string(entry)?;
    line.push('\n');

    let mut file = OpenOptions::new()
      .create(true)
      .append(true)
      .open(&self.path)
      .map_err(|e| self.io_err(e))?;
    file.write_all(line.as_bytes()).map_err(|e| self.io_err(e))?;
    file.sync_data().map_err(|e| self.io_err(e))?;
    Ok(())
  }

  /// Every entry in file order. A missing file is an empty log.
  pub fn read_all(&self) -> Result<Vec<SpilledWrite>> {
    let file = match fs::File::open(&self.path) {
      Ok(f) => f,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
      Err(e) => return Err(self.io_err(e)),
    };

    let mut entries = vec![];
    for (idx, line) in BufReader::new(file).lines().enumerate() {
      let line = line.map_err(|e| self.io_err(e))?;
      if line.trim().is_empty() {
        continue;
      }
      let entry = serde_json::from_str(&line).map_err(|e| Error::MalformedSpill {
        line:   idx + 1,
        reason: e.to_string(),
      })?;
      entries.push(entry);
    }
    Ok(entries)
  }

  /// Replace the log with `entries`, via a sibling temp file and rename.
  pub fn rewrite(&self, entries: &[SpilledWrite]) -> Result<()> {
    let mut tmp = self.path.clone().into_os_string();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let mut body = String::new();
    for entry in entries {
      body.push_str(&serde_json::to_string(entry)?);
      body.push('\n');
    }

    let mut file = fs::File::create(&tmp).map_err(|e| self.io_err(e))?;
    file.write_all(body.as_bytes()).map_err(|e| self.io_err(e))?;
    file.sync_data().map_err(|e| self.io_err(e))?;
    fs::rename(&tmp, &self.path).map_err(|e| self.io_err(e))?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn statement() -> Statement {
    Statement {
      sql:      "INSERT INTO observations (timestamp, source_id, value) VALUES (?1, ?2, ?3)"
        .into(),
      params:   vec![Value::Real(10.5), Value::Integer(3), Value::Null],
      requires: vec![NameRef { category: Category::Source, name: "dylos".into() }],
    }
  }

  #[test]
  fn append_then_read_preserves_statement() {
    let dir = tempfile::tempdir().unwrap();
    let log = FallbackLog::new(dir.path().join("spill.jsonl"));

    log.append(&SpilledWrite::from_statement(&statement(), 100.0)).unwrap();
    log.append(&SpilledWrite::from_statement(&statement(), 101.0)).unwrap();

    let entries = log.read_all().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].spilled_at, 101.0);

    let back = entries[0].to_statement();
    assert_eq!(back.sql, statement().sql);
    assert_eq!(back.params, statement().params);
    assert_eq!(back.requires, statement().requires);
  }

  #[test]
  fn whole_number_reals_stay_real() {
    let stmt = Statement {
      sql:      "SELECT ?1".into(),
      params:   vec![Value::Real(30.0)],
      requires: vec![],
    };
    let line = serde_json::to_string(&SpilledWrite::from_statement(&stmt, 0.0)).unwrap();
    let entry: SpilledWrite = serde_json::from_str(&line).unwrap();
    assert_eq!(entry.to_statement().params, vec![Value::Real(30.0)]);
  }

  #[test]
  fn missing_file_reads_empty() {
    let dir = tempfile::tempdir().unwrap();
    let log = FallbackLog::new(dir.path().join("absent.jsonl"));
    assert!(log.read_all().unwrap().is_empty());
  }

  #[test]
  fn rewrite_replaces_contents() {
    let dir = tempfile::tempdir().unwrap();
    let log = FallbackLog::new(dir.path().join("spill.jsonl"));
    log.append(&SpilledWrite::from_statement(&statement(), 1.0)).unwrap();
    log.append(&SpilledWrite::from_statement(&statement(), 2.0)).unwrap();

    let keep = log.read_all().unwrap().split_off(1);
    log.rewrite(&keep).unwrap();

    let entries = log.read_all().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].spilled_at, 2.0);
  }

  #[test]
  fn garbage_line_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("spill.jsonl");
    fs::write(&path, "{not json}\n").unwrap();
    let err = FallbackLog::new(path).read_all().unwrap_err();
    assert!(matches!(err, Error::MalformedSpill { line: 1, .. }));
  }
}
