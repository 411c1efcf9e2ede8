//! CSV importers for logger exports and location timelines.

use std::io::{BufRead, BufReader, Read};

use sensorlog_core::{
  observation::{NewLocationEntry, NewObservation, WriteOutcome},
  store::ObservationStore,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
  Error, Result,
  profile::{ColumnMatch, ImportProfile, TimestampFormat},
  time,
};

#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
  /// Attach the location/position/status in effect at each row's timestamp.
  /// Rows recorded before the first location transition are skipped.
  pub backfill_context: bool,
  /// Free-text notes attached to every imported observation.
  pub notes:            Option<String>,
}

/// Tally of one import run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
  /// Data rows read, excluding the header.
  pub rows:            usize,
  pub recorded:        usize,
  /// Writes that landed in the fallback log instead of the store.
  pub spilled:         usize,
  pub skipped_blank:   usize,
  /// Rows with an unreadable timestamp, or cells whose value is not a
  /// finite number.
  pub skipped_invalid: usize,
  /// Rows dropped because no location was known at their timestamp.
  pub no_context:      usize,
}

impl ImportReport {
  fn count(&mut self, outcome: WriteOutcome) {
    match outcome {
      WriteOutcome::Written => self.recorded += 1,
      WriteOutcome::Spilled => self.spilled += 1,
    }
  }
}

/// Skip `lines` leading lines, then open a CSV reader over the rest.
fn csv_reader<R: Read>(reader: R, lines: usize) -> Result<csv::Reader<BufReader<R>>> {
  let mut buf = BufReader::new(reader);
  let mut discard = String::new();
  for _ in 0..lines {
    discard.clear();
    buf.read_line(&mut discard)?;
  }
  Ok(
    csv::ReaderBuilder::new()
      .flexible(true)
      .trim(csv::Trim::All)
      .from_reader(buf),
  )
}

fn find(headers: &csv::StringRecord, column: &ColumnMatch) -> Result<usize> {
  column.find(headers).ok_or_else(|| Error::MissingColumn(column.to_string()))
}

/// Import a logger export through `profile`. Each mapped cell becomes one
/// observation under the column's source name. Batched writes are flushed
/// before returning.
pub async fn import_observations<S, R>(
  store: &S,
  profile: &ImportProfile,
  reader: R,
  opts: &ImportOptions,
) -> Result<ImportReport>
where
  S: ObservationStore,
  R: Read,
{
  if profile.columns.is_empty() {
    return Err(Error::EmptyColumnMap(profile.name.clone()));
  }

  let mut csv = csv_reader(reader, profile.skip_lines)?;
  let headers = csv.headers()?.clone();
  let ts_col = find(&headers, &profile.timestamp_column)?;

  let mut columns = Vec::with_capacity(profile.columns.len());
  for (column, source) in &profile.columns {
    match column.find(&headers) {
      Some(idx) => columns.push((idx, source.as_str())),
      None => warn!(profile = %profile.name, %column, "column not present in export"),
    }
  }
  if columns.is_empty() {
    let wanted: Vec<_> = profile.columns.iter().map(|(c, _)| c.to_string()).collect();
    return Err(Error::MissingColumn(wanted.join(", ")));
  }

  let mut report = ImportReport::default();
  for record in csv.records() {
    let record = record?;
    report.rows += 1;

    let raw_ts = record.get(ts_col).unwrap_or_default();
    let Some(timestamp) = profile.timestamp_format.parse(raw_ts) else {
      debug!(row = report.rows, raw_ts, "unreadable timestamp");
      report.skipped_invalid += 1;
      continue;
    };

    let context = if opts.backfill_context {
      match store.resolve_context(timestamp).await.map_err(Error::store)? {
        Some(ctx) => Some(ctx),
        None => {
          report.no_context += 1;
          continue;
        }
      }
    } else {
      None
    };

    for &(idx, source) in &columns {
      let cell = record.get(idx).unwrap_or_default();
      if cell.is_empty() {
        report.skipped_blank += 1;
        continue;
      }
      let Some(value) = cell.parse::<f64>().ok().filter(|v| v.is_finite()) else {
        report.skipped_invalid += 1;
        continue;
      };

      let mut obs = NewObservation::new(source, value).at(timestamp);
      if let Some(ctx) = &context {
        obs = obs.with_context(ctx.clone());
      }
      if let Some(notes) = &opts.notes {
        obs = obs.notes(notes.as_str());
      }
      let outcome = store.record(obs).await.map_err(Error::store)?;
      report.count(outcome);
    }
  }

  store.flush().await.map_err(Error::store)?;
  info!(profile = %profile.name, ?report, "import finished");
  Ok(report)
}

/// Import a location timeline with `TIMESTAMP,LOCATION,POSITION,STATUS`
/// columns. Timestamps may be Unix seconds or a date-time.
pub async fn import_locations<S, R>(store: &S, reader: R) -> Result<ImportReport>
where
  S: ObservationStore,
  R: Read,
{
  let mut csv = csv_reader(reader, 0)?;
  let headers = csv.headers()?.clone();
  let column = |name: &str| find(&headers, &ColumnMatch::Exact(name.into()));
  let ts_col = column("TIMESTAMP")?;
  let loc_col = column("LOCATION")?;
  let pos_col = column("POSITION")?;
  let status_col = column("STATUS")?;

  let mut report = ImportReport::default();
  for record in csv.records() {
    let record = record?;
    report.rows += 1;

    let raw_ts = record.get(ts_col).unwrap_or_default();
    let timestamp = TimestampFormat::UnixSeconds
      .parse(raw_ts)
      .or_else(|| time::parse_datetime(raw_ts));
    let Some(timestamp) = timestamp else {
      report.skipped_invalid += 1;
      continue;
    };

    let cell = |idx: usize| record.get(idx).unwrap_or_default();
    let (location, position, status) = (cell(loc_col), cell(pos_col), cell(status_col));
    if location.is_empty() || position.is_empty() || status.is_empty() {
      report.skipped_blank += 1;
      continue;
    }

    let entry = NewLocationEntry::new(location, position, status).at(timestamp);
    let outcome = store.record_location(entry).await.map_err(Error::store)?;
    report.count(outcome);
  }

  store.flush().await.map_err(Error::store)?;
  info!(?report, "location import finished");
  Ok(report)
}
