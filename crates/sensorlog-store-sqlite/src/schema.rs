//! SQL schema for the sensorlog SQLite store.
//!
//! One versioned schema. Each entry of [`MIGRATIONS`] moves the store from
//! `PRAGMA user_version = i` to `i + 1`; stores already at the latest
//! version are left untouched.

use rusqlite::Connection;

/// Per-connection settings; not persisted by SQLite.
pub const PRAGMAS: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
";

const V1_TABLES: &str = "
CREATE TABLE IF NOT EXISTS sources (
    id    INTEGER PRIMARY KEY,
    name  TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS locations (
    id    INTEGER PRIMARY KEY,
    name  TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS positions (
    id    INTEGER PRIMARY KEY,
    name  TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS statuses (
    id    INTEGER PRIMARY KEY,
    name  TEXT NOT NULL UNIQUE
);

-- Append-only. No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS observations (
    timestamp    REAL    NOT NULL,   -- Unix seconds
    source_id    INTEGER NOT NULL REFERENCES sources(id),
    location_id  INTEGER REFERENCES locations(id),
    position_id  INTEGER REFERENCES positions(id),
    status_id    INTEGER REFERENCES statuses(id),
    value        REAL    NOT NULL,
    notes        TEXT
);

-- Append-only; seq is the insertion order.
CREATE TABLE IF NOT EXISTS location_history (
    seq          INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp    REAL    NOT NULL,
    location_id  INTEGER NOT NULL REFERENCES locations(id),
    position_id  INTEGER NOT NULL REFERENCES positions(id),
    status_id    INTEGER NOT NULL REFERENCES statuses(id)
);
";

const V2_INDEXES: &str = "
CREATE INDEX IF NOT EXISTS observations_timestamp_idx ON observations(timestamp);
CREATE INDEX IF NOT EXISTS observations_source_idx    ON observations(source_id);
CREATE INDEX IF NOT EXISTS history_timestamp_idx      ON location_history(timestamp);
";

pub const MIGRATIONS: &[&str] = &[V1_TABLES, V2_INDEXES];

pub fn version(conn: &Connection) -> rusqlite::Result<usize> {
  conn.query_row("PRAGMA user_version", [], |row| row.get(0))
}

/// Apply every migration newer than the store's `user_version`, each in its
/// own transaction. Returns the number applied.
pub fn migrate(conn: &mut Connection) -> rusqlite::Result<usize> {
  let current = version(conn)?;
  let mut applied = 0;

  for (idx, sql) in MIGRATIONS.iter().enumerate().skip(current) {
    let tx = conn.transaction()?;
    tx.execute_batch(sql)?;
    tx.pragma_update(None, "user_version", (idx + 1) as i64)?;
    tx.commit()?;
    applied += 1;
  }

  if applied > 0 {
    tracing::info!(from = current, to = MIGRATIONS.len(), "migrated store schema");
  }
  Ok(applied)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn migrate_is_idempotent() {
    let mut conn = Connection::open_in_memory().unwrap();
    assert_eq!(migrate(&mut conn).unwrap(), MIGRATIONS.len());
    assert_eq!(migrate(&mut conn).unwrap(), 0);
    assert_eq!(version(&conn).unwrap(), MIGRATIONS.len());
  }

  #[test]
  fn partially_migrated_store_catches_up() {
    let mut conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(V1_TABLES).unwrap();
    conn.pragma_update(None, "user_version", 1_i64).unwrap();

    assert_eq!(migrate(&mut conn).unwrap(), 1);
    let has_index: bool = conn
      .query_row(
        "SELECT 1 FROM sqlite_master WHERE name = 'history_timestamp_idx'",
        [],
        |_| Ok(true),
      )
      .unwrap();
    assert!(has_index);
  }
}
