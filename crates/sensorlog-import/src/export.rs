//! CSV export of the joined observation read path.

use std::io::Write;

use sensorlog_core::store::{ObservationQuery, ObservationStore};

use crate::{Error, Result};

pub const HEADER: [&str; 7] =
  ["timestamp", "source", "location", "position", "status", "value", "notes"];

/// Write every observation matching `query` as CSV, header first. Missing
/// context names and notes are written as empty cells. Returns the number
/// of data rows written.
pub async fn export_csv<S, W>(store: &S, query: &ObservationQuery, writer: W) -> Result<usize>
where
  S: ObservationStore,
  W: Write,
{
  let rows = store.observations(query).await.map_err(Error::store)?;

  let mut out = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
  out.write_record(HEADER)?;
  for row in &rows {
    out.serialize(row)?;
  }
  out.flush()?;
  Ok(rows.len())
}

#[cfg(test)]
mod tests {
  use sensorlog_core::observation::NewObservation;
  use sensorlog_store_sqlite::SqliteStore;

  use super::*;

  #[tokio::test]
  async fn writes_header_and_rows() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    store
      .record(NewObservation::new("dylos smallparticles", 350.0).at(100.0).location("kitchen"))
      .await
      .unwrap();
    store
      .record(NewObservation::new("dylos largeparticles", 12.5).at(101.0).notes("window open"))
      .await
      .unwrap();
    store.flush().await.unwrap();

    let mut buf = Vec::new();
    let n = export_csv(&store, &ObservationQuery::default(), &mut buf).await.unwrap();
    assert_eq!(n, 2);
    assert_eq!(
      String::from_utf8(buf).unwrap(),
      "timestamp,source,location,position,status,value,notes\n\
       100.0,dylos smallparticles,kitchen,,,350.0,\n\
       101.0,dylos largeparticles,,,,12.5,window open\n"
    );
  }

  #[tokio::test]
  async fn empty_store_still_writes_header() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let mut buf = Vec::new();
    let n = export_csv(&store, &ObservationQuery::default(), &mut buf).await.unwrap();
    assert_eq!(n, 0);
    assert_eq!(buf, b"timestamp,source,location,position,status,value,notes\n");
  }
}
