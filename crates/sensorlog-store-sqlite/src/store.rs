//! [`SqliteStore`], the SQLite implementation of [`ObservationStore`].

use std::{
  sync::{Arc, Mutex},
  time::Duration,
};

use rusqlite::{OptionalExtension as _, types::Value};
use sensorlog_core::{
  Category,
  observation::{
    Context, LocationRow, NameRecord, NewLocationEntry, NewObservation,
    ObservationRow, WriteOutcome, now,
  },
  store::{HistoryQuery, ObservationQuery, ObservationStore},
};

use crate::{
  ContextOrdering, Error, Result, StoreConfig,
  durable::{DurableWriter, Statement, WriterStats},
  fallback::{NameRef, ReplayReport, SpilledWrite},
  registry::{self, NameCache},
  schema::{self, PRAGMAS},
};

/// Lock wait while migrating, so two processes opening a fresh file at once
/// do not trip over each other.
const MIGRATION_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// ─── SQL ─────────────────────────────────────────────────────────────────────

const INSERT_OBSERVATION: &str = "INSERT INTO observations (
   timestamp, source_id, location_id, position_id, status_id, value, notes
 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)";

/// Spill form used when the names could not be registered; ids are looked up
/// at replay time, after the `requires` names exist.
const INSERT_OBSERVATION_BY_NAME: &str = "INSERT INTO observations (
   timestamp, source_id, location_id, position_id, status_id, value, notes
 ) VALUES (
   ?1,
   (SELECT id FROM sources   WHERE name = ?2),
   (SELECT id FROM locations WHERE name = ?3),
   (SELECT id FROM positions WHERE name = ?4),
   (SELECT id FROM statuses  WHERE name = ?5),
   ?6, ?7
 )";

const INSERT_HISTORY: &str = "INSERT INTO location_history (
   timestamp, location_id, position_id, status_id
 ) VALUES (?1, ?2, ?3, ?4)";

const INSERT_HISTORY_BY_NAME: &str = "INSERT INTO location_history (
   timestamp, location_id, position_id, status_id
 ) VALUES (
   ?1,
   (SELECT id FROM locations WHERE name = ?2),
   (SELECT id FROM positions WHERE name = ?3),
   (SELECT id FROM statuses  WHERE name = ?4)
 )";

const HISTORY_COLUMNS: &str = "SELECT h.seq, h.timestamp, l.name, p.name, s.name
 FROM location_history h
 JOIN locations l ON l.id = h.location_id
 JOIN positions p ON p.id = h.position_id
 JOIN statuses  s ON s.id = h.status_id";

fn context_sql(ordering: ContextOrdering) -> String {
  let order = match ordering {
    ContextOrdering::Timestamp => "h.timestamp DESC, h.seq DESC",
    ContextOrdering::Arrival => "h.seq DESC",
  };
  format!("{HISTORY_COLUMNS} WHERE h.timestamp < ?1 ORDER BY {order} LIMIT 1")
}

/// SQLite counts are `i64`; anything larger is as good as unbounded.
fn sql_count(n: usize) -> i64 { i64::try_from(n).unwrap_or(i64::MAX) }

fn int(id: Option<i64>) -> Value { id.map_or(Value::Null, Value::Integer) }

fn text(s: Option<&str>) -> Value { s.map_or(Value::Null, |s| Value::Text(s.to_owned())) }

fn name_refs(names: &[(Category, Option<&str>)]) -> Vec<NameRef> {
  names
    .iter()
    .filter_map(|&(category, name)| {
      name.map(|n| NameRef { category, name: n.to_owned() })
    })
    .collect()
}

fn location_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<LocationRow> {
  Ok(LocationRow {
    seq:       row.get(0)?,
    timestamp: row.get(1)?,
    location:  row.get(2)?,
    position:  row.get(3)?,
    status:    row.get(4)?,
  })
}

// ─── Writer state ────────────────────────────────────────────────────────────

/// Everything a write needs besides the connection. Only touched from the
/// connection thread.
struct Inner {
  cache:  NameCache,
  writer: DurableWriter,
}

impl Inner {
  fn resolve(
    &mut self,
    conn: &rusqlite::Connection,
    category: Category,
    name: Option<&str>,
  ) -> Result<Option<i64>> {
    registry::resolve(conn, &mut self.cache, &mut self.writer, category, name)
  }

  fn resolve_each<const N: usize>(
    &mut self,
    conn: &rusqlite::Connection,
    names: [(Category, Option<&str>); N],
  ) -> Result<[Option<i64>; N]> {
    let mut ids = [None; N];
    for (slot, (category, name)) in ids.iter_mut().zip(names) {
      *slot = self.resolve(conn, category, name)?;
    }
    Ok(ids)
  }

  fn record(
    &mut self,
    conn: &rusqlite::Connection,
    obs: &NewObservation,
    timestamp: f64,
  ) -> Result<WriteOutcome> {
    let [location, position, status] = obs.context_names();
    let names = [(Category::Source, Some(obs.source.as_str())), location, position, status];

    let stmt = match self.resolve_each(conn, names) {
      Ok(ids) => Statement::new(INSERT_OBSERVATION, vec![
        Value::Real(timestamp),
        int(ids[0]),
        int(ids[1]),
        int(ids[2]),
        int(ids[3]),
        Value::Real(obs.value),
        text(obs.notes.as_deref()),
      ]),
      Err(e) if e.is_busy() => Statement::new(INSERT_OBSERVATION_BY_NAME, vec![
        Value::Real(timestamp),
        text(names[0].1),
        text(names[1].1),
        text(names[2].1),
        text(names[3].1),
        Value::Real(obs.value),
        text(obs.notes.as_deref()),
      ])
      .requiring(name_refs(&names)),
      Err(e) => return Err(e),
    };

    self.writer.execute(conn, &stmt)
  }

  fn record_location(
    &mut self,
    conn: &rusqlite::Connection,
    entry: &NewLocationEntry,
    timestamp: f64,
  ) -> Result<WriteOutcome> {
    let names = entry.names().map(|(category, name)| (category, Some(name)));

    let stmt = match self.resolve_each(conn, names) {
      Ok(ids) => Statement::new(INSERT_HISTORY, vec![
        Value::Real(timestamp),
        int(ids[0]),
        int(ids[1]),
        int(ids[2]),
      ]),
      Err(e) if e.is_busy() => Statement::new(INSERT_HISTORY_BY_NAME, vec![
        Value::Real(timestamp),
        text(names[0].1),
        text(names[1].1),
        text(names[2].1),
      ])
      .requiring(name_refs(&names)),
      Err(e) => return Err(e),
    };

    self.writer.execute(conn, &stmt)
  }

  /// Register the names `entry` depends on. `Ok(false)` means a name is
  /// still contended; the entry stays in the log.
  fn register_requires(&mut self, conn: &rusqlite::Connection, entry: &SpilledWrite) -> Result<bool> {
    for name in &entry.requires {
      match self.resolve(conn, name.category, Some(name.name.as_str())) {
        Ok(_) => {}
        Err(e) if e.is_busy() => return Ok(false),
        Err(e) => return Err(e),
      }
    }
    Ok(true)
  }

  fn replay(&mut self, conn: &rusqlite::Connection) -> Result<ReplayReport> {
    let entries = self.writer.log().read_all()?;
    if entries.is_empty() {
      return Ok(ReplayReport::default());
    }
    let total = entries.len();

    // Earlier writes go out on their own so a failed replay commit can be
    // rolled back without touching them.
    self.writer.commit(conn)?;

    // Registration commits, so every name is registered before the first
    // entry is written.
    let ready: Vec<_> = entries
      .iter()
      .map(|entry| self.register_requires(conn, entry))
      .collect();

    // One transaction for the whole pass: nothing replayed is committed
    // unless the log is rewritten to match.
    self.writer.hold_checkpoints(true);
    let mut kept = vec![];
    for (entry, ready) in entries.into_iter().zip(ready) {
      let replayed = match ready {
        Ok(true) => self.writer.write(conn, &entry.to_statement()).map(|w| w.is_some()),
        other => other,
      };
      match replayed {
        Ok(true) => {}
        Ok(false) => kept.push(entry),
        Err(e) => {
          tracing::error!(error = %e, sql = %entry.sql, "replay failed; entry kept");
          kept.push(entry);
        }
      }
    }
    self.writer.hold_checkpoints(false);

    if let Err(e) = self.writer.commit(conn) {
      self.writer.rollback(conn)?;
      return Err(e);
    }

    self.writer.log().rewrite(&kept)?;

    let report = ReplayReport { replayed: total - kept.len(), remaining: kept.len() };
    tracing::info!(replayed = report.replayed, remaining = report.remaining, "replayed fallback log");
    Ok(report)
  }
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A sensorlog observation store backed by a single SQLite file.
///
/// Cloning is cheap; clones share the connection, the name cache and the
/// write batch. Call [`flush`](ObservationStore::flush) or
/// [`close`](Self::close) before dropping the last clone: SQLite rolls back
/// an uncommitted batch when the connection goes away.
#[derive(Clone)]
pub struct SqliteStore {
  conn:     tokio_rusqlite::Connection,
  inner:    Arc<Mutex<Inner>>,
  ordering: ContextOrdering,
}

impl SqliteStore {
  /// Open (or create) the store at `config.path` and migrate its schema.
  pub async fn open(config: StoreConfig) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(&config.path).await?;
    tracing::info!(path = %config.path.display(), "opened store");
    Self::init(conn, config).await
  }

  /// Open an in-memory store with default settings, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    Self::open_in_memory_with(StoreConfig::default()).await
  }

  /// Open an in-memory store; `config.path` is ignored.
  pub async fn open_in_memory_with(config: StoreConfig) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn, config).await
  }

  async fn init(conn: tokio_rusqlite::Connection, config: StoreConfig) -> Result<Self> {
    let busy_timeout = config.busy_timeout();
    conn
      .call(move |conn| {
        conn.busy_timeout(MIGRATION_BUSY_TIMEOUT)?;
        conn.execute_batch(PRAGMAS)?;
        schema::migrate(conn)?;
        conn.busy_timeout(busy_timeout)?;
        Ok(())
      })
      .await?;

    Ok(Self {
      conn,
      inner: Arc::new(Mutex::new(Inner {
        cache:  NameCache::default(),
        writer: DurableWriter::new(&config),
      })),
      ordering: config.context_ordering,
    })
  }

  /// Run `f` on the connection thread with the writer state locked.
  async fn with_inner<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&mut rusqlite::Connection, &mut Inner) -> Result<T> + Send + 'static,
  {
    let inner = Arc::clone(&self.inner);
    self
      .conn
      .call(move |conn| {
        let Ok(mut guard) = inner.lock() else {
          return Ok(Err(Error::StatePoisoned));
        };
        Ok(f(conn, &mut guard))
      })
      .await?
  }

  /// Resolve a name to its id, registering it on first use.
  pub async fn resolve(&self, category: Category, name: Option<&str>) -> Result<Option<i64>> {
    let name = name.map(str::to_owned);
    self
      .with_inner(move |conn, inner| inner.resolve(conn, category, name.as_deref()))
      .await
  }

  /// The name registered under `id`, if any.
  pub async fn name_of(&self, category: Category, id: i64) -> Result<Option<String>> {
    self
      .with_inner(move |conn, inner| {
        registry::name_of(conn, &mut inner.cache, &inner.writer, category, id)
      })
      .await
  }

  pub async fn stats(&self) -> Result<WriterStats> {
    self.with_inner(|_, inner| Ok(inner.writer.stats())).await
  }

  /// Re-execute spilled writes in order. Entries that fail again stay in
  /// the log; the rest are removed from it.
  pub async fn replay_fallback(&self) -> Result<ReplayReport> {
    self.with_inner(|conn, inner| inner.replay(conn)).await
  }

  /// Commit outstanding writes and close the connection.
  pub async fn close(self) -> Result<()> {
    self.flush().await?;
    self.conn.close().await?;
    Ok(())
  }
}

// ─── ObservationStore impl ───────────────────────────────────────────────────

impl ObservationStore for SqliteStore {
  type Error = Error;

  // ── Writes ────────────────────────────────────────────────────────────────

  async fn record(&self, input: NewObservation) -> Result<WriteOutcome> {
    let obs = input.normalized()?;
    let timestamp = obs.timestamp.unwrap_or_else(now);
    self
      .with_inner(move |conn, inner| inner.record(conn, &obs, timestamp))
      .await
  }

  async fn record_location(&self, input: NewLocationEntry) -> Result<WriteOutcome> {
    input.validate()?;
    let timestamp = input.timestamp.unwrap_or_else(now);
    self
      .with_inner(move |conn, inner| inner.record_location(conn, &input, timestamp))
      .await
  }

  async fn flush(&self) -> Result<()> {
    self.with_inner(|conn, inner| inner.writer.commit(conn)).await
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn resolve_context(&self, timestamp: f64) -> Result<Option<Context>> {
    let sql = context_sql(self.ordering);

    let row: Option<LocationRow> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .prepare_cached(&sql)?
            .query_row([timestamp], location_row)
            .optional()?,
        )
      })
      .await?;

    Ok(row.as_ref().map(LocationRow::context))
  }

  async fn observations(&self, query: &ObservationQuery) -> Result<Vec<ObservationRow>> {
    let since  = query.since;
    let until  = query.until;
    let source = query.source.clone();
    let limit  = query.limit.map_or(-1, sql_count);
    let offset = query.offset.map_or(0, sql_count);

    let rows = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare_cached(
          "SELECT o.timestamp, src.name, l.name, p.name, s.name, o.value, o.notes
           FROM observations o
           JOIN      sources   src ON src.id = o.source_id
           LEFT JOIN locations l   ON l.id   = o.location_id
           LEFT JOIN positions p   ON p.id   = o.position_id
           LEFT JOIN statuses  s   ON s.id   = o.status_id
           WHERE (?1 IS NULL OR o.timestamp >= ?1)
             AND (?2 IS NULL OR o.timestamp <= ?2)
             AND (?3 IS NULL OR src.name = ?3)
           ORDER BY o.timestamp, o.rowid
           LIMIT ?4 OFFSET ?5",
        )?;

        let rows = stmt
          .query_map(rusqlite::params![since, until, source, limit, offset], |row| {
            Ok(ObservationRow {
              timestamp: row.get(0)?,
              source:    row.get(1)?,
              location:  row.get(2)?,
              position:  row.get(3)?,
              status:    row.get(4)?,
              value:     row.get(5)?,
              notes:     row.get(6)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows)
      })
      .await?;

    Ok(rows)
  }

  async fn location_history(&self, query: &HistoryQuery) -> Result<Vec<LocationRow>> {
    let since = query.since;
    let until = query.until;
    let limit = query.limit.map_or(-1, sql_count);

    let rows = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "{HISTORY_COLUMNS}
           WHERE (?1 IS NULL OR h.timestamp >= ?1)
             AND (?2 IS NULL OR h.timestamp <= ?2)
           ORDER BY h.timestamp, h.seq
           LIMIT ?3"
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![since, until, limit], location_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(rows)
  }

  async fn names(&self, category: Category) -> Result<Vec<NameRecord>> {
    let rows = self
      .conn
      .call(move |conn| {
        let mut stmt = conn
          .prepare_cached(&format!("SELECT id, name FROM {} ORDER BY id", category.table()))?;
        let rows = stmt
          .query_map([], |row| Ok(NameRecord { id: row.get(0)?, name: row.get(1)? }))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(rows)
  }
}
