//! `sensorlog` binary.
//!
//! Reads `sensorlog.toml` (or the path given with `--config`), layered under
//! `SENSORLOG_*` environment variables, opens the SQLite store and runs one
//! subcommand against it. Nested keys use a double underscore, e.g.
//! `SENSORLOG_STORE__PATH=/data/observations.db`.

use std::{
  fs::File,
  io::{self, BufWriter},
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use sensorlog_core::{
  observation::{NewLocationEntry, NewObservation, now},
  store::{ObservationQuery, ObservationStore},
};
use sensorlog_import::{ImportOptions, ImportProfile, time};
use sensorlog_store_sqlite::{SqliteStore, StoreConfig};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Sensor observation logger")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "sensorlog.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Serve the HTTP ingestion and read API.
  Serve,
  /// Record one observation.
  Record {
    source:    String,
    value:     f64,
    #[arg(long)]
    location:  Option<String>,
    #[arg(long)]
    position:  Option<String>,
    #[arg(long)]
    status:    Option<String>,
    /// Unix seconds or a date-time; defaults to now.
    #[arg(long, value_parser = parse_timestamp)]
    timestamp: Option<f64>,
    #[arg(long)]
    notes:     Option<String>,
  },
  /// Record a location/position/status transition.
  Locate {
    location:  String,
    position:  String,
    status:    String,
    #[arg(long, value_parser = parse_timestamp)]
    timestamp: Option<f64>,
  },
  /// Print the context in effect just before a timestamp (default now).
  Context {
    #[arg(value_parser = parse_timestamp)]
    timestamp: Option<f64>,
  },
  /// Import a logger CSV export.
  Import {
    #[arg(short, long, value_enum)]
    format:           Format,
    file:             PathBuf,
    /// Attach the location context in effect at each row's timestamp.
    #[arg(long)]
    backfill_context: bool,
    #[arg(long)]
    notes:            Option<String>,
  },
  /// Import a TIMESTAMP,LOCATION,POSITION,STATUS timeline.
  ImportLocations { file: PathBuf },
  /// Write observations as CSV.
  Export {
    /// Output file; stdout when omitted.
    #[arg(short, long)]
    output: Option<PathBuf>,
    #[arg(long, value_parser = parse_timestamp)]
    since:  Option<f64>,
    #[arg(long, value_parser = parse_timestamp)]
    until:  Option<f64>,
    #[arg(long)]
    source: Option<String>,
  },
  /// Re-apply writes spilled to the fallback log.
  Replay,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
  Dylos,
  Adxl345,
  Hobo,
}

impl Format {
  fn profile(self) -> ImportProfile {
    match self {
      Self::Dylos => ImportProfile::dylos(),
      Self::Adxl345 => ImportProfile::adxl345(),
      Self::Hobo => ImportProfile::hobo_u12(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct AppConfig {
  host:  String,
  port:  u16,
  store: StoreConfig,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      host:  "127.0.0.1".into(),
      port:  8080,
      store: StoreConfig::default(),
    }
  }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_writer(io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(
      config::Environment::with_prefix("SENSORLOG")
        .prefix_separator("_")
        .separator("__"),
    )
    .build()
    .context("failed to read config file")?;

  let mut app_cfg: AppConfig = settings
    .try_deserialize()
    .context("failed to deserialise AppConfig")?;
  app_cfg.store.path = expand_tilde(&app_cfg.store.path);
  app_cfg.store.fallback_log = expand_tilde(&app_cfg.store.fallback_log);

  let store_path = app_cfg.store.path.clone();
  let store = SqliteStore::open(app_cfg.store.clone())
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  match cli.command {
    Command::Serve => return serve(store, &app_cfg).await,
    Command::Record { source, value, location, position, status, timestamp, notes } => {
      let input = NewObservation {
        source,
        value,
        location,
        position,
        status,
        timestamp,
        notes,
      };
      let outcome = store.record(input).await?;
      print_json(&outcome)?;
    }
    Command::Locate { location, position, status, timestamp } => {
      let mut entry = NewLocationEntry::new(location, position, status);
      entry.timestamp = timestamp;
      let outcome = store.record_location(entry).await?;
      print_json(&outcome)?;
    }
    Command::Context { timestamp } => {
      let context = store.resolve_context(timestamp.unwrap_or_else(now)).await?;
      print_json(&context)?;
    }
    Command::Import { format, file, backfill_context, notes } => {
      let reader = File::open(&file).with_context(|| format!("failed to open {file:?}"))?;
      let opts = ImportOptions { backfill_context, notes };
      let report = sensorlog_import::import_observations(&store, &format.profile(), reader, &opts)
        .await
        .with_context(|| format!("failed to import {file:?}"))?;
      print_json(&report)?;
    }
    Command::ImportLocations { file } => {
      let reader = File::open(&file).with_context(|| format!("failed to open {file:?}"))?;
      let report = sensorlog_import::import_locations(&store, reader)
        .await
        .with_context(|| format!("failed to import {file:?}"))?;
      print_json(&report)?;
    }
    Command::Export { output, since, until, source } => {
      let query = ObservationQuery { since, until, source, ..Default::default() };
      let rows = match output {
        Some(path) => {
          let file = File::create(&path).with_context(|| format!("failed to create {path:?}"))?;
          sensorlog_import::export_csv(&store, &query, BufWriter::new(file)).await?
        }
        None => sensorlog_import::export_csv(&store, &query, io::stdout().lock()).await?,
      };
      tracing::info!(rows, "export finished");
    }
    Command::Replay => {
      let report = store.replay_fallback().await.context("replay failed")?;
      print_json(&report)?;
    }
  }

  store.close().await.context("failed to close store")?;
  Ok(())
}

async fn serve(store: SqliteStore, cfg: &AppConfig) -> anyhow::Result<()> {
  let store = Arc::new(store);
  let app = sensorlog_api::api_router(store.clone());
  let address = format!("{}:{}", cfg.host, cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app)
    .with_graceful_shutdown(async {
      let _ = tokio::signal::ctrl_c().await;
    })
    .await
    .context("server error")?;

  store.flush().await.context("failed to flush store")?;
  Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

/// Unix seconds, or any date-time the importers understand.
fn parse_timestamp(raw: &str) -> Result<f64, String> {
  time::parse_unix(raw)
    .or_else(|| time::parse_datetime(raw))
    .ok_or_else(|| format!("unrecognised timestamp {raw:?}"))
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn cli_parses_import() {
    let cli = Cli::parse_from([
      "sensorlog",
      "import",
      "--format",
      "hobo",
      "office.csv",
      "--backfill-context",
    ]);
    assert!(matches!(
      cli.command,
      Command::Import { format: Format::Hobo, backfill_context: true, .. }
    ));
  }

  #[test]
  fn timestamps_accept_unix_and_rfc3339() {
    assert_eq!(parse_timestamp("1400000000"), Ok(1_400_000_000.0));
    assert_eq!(parse_timestamp("2014-05-13T16:53:20Z"), Ok(1_400_000_000.0));
    assert!(parse_timestamp("yesterday").is_err());
  }

  #[test]
  fn config_defaults_fill_missing_keys() {
    let cfg: AppConfig = config::Config::builder()
      .add_source(config::File::from_str(
        "port = 9000\n[store]\ncommit_interval = 5\n",
        config::FileFormat::Toml,
      ))
      .build()
      .unwrap()
      .try_deserialize()
      .unwrap();
    assert_eq!(cfg.host, "127.0.0.1");
    assert_eq!(cfg.port, 9000);
    assert_eq!(cfg.store.commit_interval, 5);
    assert_eq!(cfg.store.max_attempts, 10);
  }

  #[test]
  fn tilde_expands_to_home() {
    let Ok(home) = std::env::var("HOME") else { return };
    assert_eq!(expand_tilde(Path::new("~/obs.db")), PathBuf::from(home).join("obs.db"));
    assert_eq!(expand_tilde(Path::new("/tmp/obs.db")), PathBuf::from("/tmp/obs.db"));
  }
}
