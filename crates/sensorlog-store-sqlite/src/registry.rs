//! Name registry: per-category name ↔ id resolution over the `sources`,
//! `locations`, `positions` and `statuses` tables, fronted by [`NameCache`].
//!
//! The cache belongs to one store instance. A category is loaded whole on
//! its first miss; afterwards only ids minted by this instance are added,
//! always after the insert has been committed. Names registered by another
//! process are picked up by the by-name re-select on the next miss.

use std::collections::HashMap;

use rusqlite::{Connection, OptionalExtension as _, types::Value};
use sensorlog_core::Category;

use crate::{
  Result,
  durable::{DurableWriter, Statement},
};

#[derive(Debug, Default)]
struct CategoryNames {
  by_name: HashMap<String, i64>,
  by_id:   HashMap<i64, String>,
}

impl CategoryNames {
  fn insert(&mut self, id: i64, name: String) {
    self.by_id.insert(id, name.clone());
    self.by_name.insert(name, id);
  }
}

#[derive(Debug, Default)]
pub struct NameCache {
  loaded: HashMap<Category, CategoryNames>,
}

impl NameCache {
  pub fn id(&self, category: Category, name: &str) -> Option<i64> {
    self.loaded.get(&category)?.by_name.get(name).copied()
  }

  pub fn name(&self, category: Category, id: i64) -> Option<&str> {
    self.loaded.get(&category)?.by_id.get(&id).map(String::as_str)
  }

  pub fn is_loaded(&self, category: Category) -> bool { self.loaded.contains_key(&category) }

  fn insert(&mut self, category: Category, id: i64, name: String) {
    self.loaded.entry(category).or_default().insert(id, name);
  }

  /// Read the whole table for `category` into the cache.
  fn load(
    &mut self,
    conn: &Connection,
    writer: &DurableWriter,
    category: Category,
  ) -> Result<()> {
    let sql = format!("SELECT id, name FROM {}", category.table());
    let rows = writer.retry_or_busy(&sql, || {
      let mut stmt = conn.prepare_cached(&sql)?;
      let rows = stmt
        .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>();
      rows
    })?;

    tracing::debug!(%category, names = rows.len(), "loaded name table");
    let names = self.loaded.entry(category).or_default();
    for (id, name) in rows {
      names.insert(id, name);
    }
    Ok(())
  }
}

fn select_id(conn: &Connection, category: Category, name: &str) -> rusqlite::Result<Option<i64>> {
  conn
    .prepare_cached(&format!("SELECT id FROM {} WHERE name = ?1", category.table()))?
    .query_row([name], |row| row.get(0))
    .optional()
}

fn select_name(conn: &Connection, category: Category, id: i64) -> rusqlite::Result<Option<String>> {
  conn
    .prepare_cached(&format!("SELECT name FROM {} WHERE id = ?1", category.table()))?
    .query_row([id], |row| row.get(0))
    .optional()
}

/// Resolve `name` to its id in `category`, registering it on first use.
///
/// `None` in, `None` out. Contention that outlasts the retry budget is
/// returned as [`Error::Busy`](crate::Error::Busy) so the caller can spill
/// its own write in by-name form.
pub fn resolve(
  conn: &Connection,
  cache: &mut NameCache,
  writer: &mut DurableWriter,
  category: Category,
  name: Option<&str>,
) -> Result<Option<i64>> {
  let Some(name) = name else {
    return Ok(None);
  };

  if let Some(id) = cache.id(category, name) {
    return Ok(Some(id));
  }

  if !cache.is_loaded(category) {
    cache.load(conn, writer, category)?;
    if let Some(id) = cache.id(category, name) {
      return Ok(Some(id));
    }
  }

  // Another writer may register the same name between our load and this
  // insert; OR IGNORE plus the re-select below makes whichever row was
  // committed first the answer for everyone.
  let insert = Statement::new(
    format!("INSERT OR IGNORE INTO {} (name) VALUES (?1)", category.table()),
    vec![Value::Text(name.to_owned())],
  );
  if writer.write(conn, &insert)?.is_none() {
    return Err(crate::Error::Busy { attempts: writer.max_attempts() });
  }
  writer.commit(conn)?;

  let id = writer
    .retry_or_busy("select id", || select_id(conn, category, name))?
    .ok_or(rusqlite::Error::QueryReturnedNoRows)?;

  tracing::debug!(%category, name, id, "registered name");
  cache.insert(category, id, name.to_owned());
  Ok(Some(id))
}

/// Map an id back to its name, consulting the table on a cache miss.
pub fn name_of(
  conn: &Connection,
  cache: &mut NameCache,
  writer: &DurableWriter,
  category: Category,
  id: i64,
) -> Result<Option<String>> {
  if let Some(name) = cache.name(category, id) {
    return Ok(Some(name.to_owned()));
  }
  let found = writer.retry_or_busy("select name", || select_name(conn, category, id))?;
  if let Some(name) = &found {
    cache.insert(category, id, name.clone());
  }
  Ok(found)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{StoreConfig, schema};

  fn setup() -> (Connection, NameCache, DurableWriter) {
    let mut conn = Connection::open_in_memory().unwrap();
    schema::migrate(&mut conn).unwrap();
    (conn, NameCache::default(), DurableWriter::new(&StoreConfig::default()))
  }

  #[test]
  fn none_resolves_to_none() {
    let (conn, mut cache, mut writer) = setup();
    for category in [Category::Source, Category::Location, Category::Position, Category::Status] {
      assert_eq!(resolve(&conn, &mut cache, &mut writer, category, None).unwrap(), None);
    }
    assert!(!cache.is_loaded(Category::Source));
  }

  #[test]
  fn same_name_same_id_one_row() {
    let (conn, mut cache, mut writer) = setup();
    let a = resolve(&conn, &mut cache, &mut writer, Category::Location, Some("copley")).unwrap();
    let b = resolve(&conn, &mut cache, &mut writer, Category::Location, Some("copley")).unwrap();
    assert_eq!(a, b);

    let rows: i64 = conn
      .query_row("SELECT COUNT(*) FROM locations WHERE name = 'copley'", [], |r| r.get(0))
      .unwrap();
    assert_eq!(rows, 1);
  }

  #[test]
  fn categories_are_independent() {
    let (conn, mut cache, mut writer) = setup();
    let loc = resolve(&conn, &mut cache, &mut writer, Category::Location, Some("x")).unwrap();
    let pos = resolve(&conn, &mut cache, &mut writer, Category::Position, Some("x")).unwrap();
    assert!(loc.is_some() && pos.is_some());
    assert_eq!(cache.name(Category::Position, pos.unwrap()), Some("x"));
    assert_eq!(cache.id(Category::Status, "x"), None);
  }

  #[test]
  fn cold_cache_sees_rows_written_elsewhere() {
    let (conn, mut cache, mut writer) = setup();
    conn.execute("INSERT INTO sources (id, name) VALUES (42, 'dylos')", []).unwrap();

    let id = resolve(&conn, &mut cache, &mut writer, Category::Source, Some("dylos")).unwrap();
    assert_eq!(id, Some(42));
    assert_eq!(
      name_of(&conn, &mut cache, &writer, Category::Source, 42).unwrap().as_deref(),
      Some("dylos")
    );
    assert_eq!(name_of(&conn, &mut cache, &writer, Category::Source, 7).unwrap(), None);
  }

  #[test]
  fn warm_cache_picks_up_concurrent_registration() {
    let (conn, mut cache, mut writer) = setup();
    resolve(&conn, &mut cache, &mut writer, Category::Status, Some("entering")).unwrap();
    // Registered behind the cache's back, as another process would.
    conn.execute("INSERT INTO statuses (id, name) VALUES (99, 'leaving')", []).unwrap();

    let id = resolve(&conn, &mut cache, &mut writer, Category::Status, Some("leaving")).unwrap();
    assert_eq!(id, Some(99));
  }
}
