//! CSV import and export for sensorlog.
//!
//! Importers map logger CSV columns onto source names and feed each cell
//! through [`ObservationStore::record`](sensorlog_core::store::ObservationStore::record),
//! optionally stitching every row to the location timeline via
//! [`resolve_context`](sensorlog_core::store::ObservationStore::resolve_context).
//! The exporter flattens the joined read path back into CSV.

pub mod error;
pub mod export;
pub mod import;
pub mod profile;
pub mod time;

pub use error::{Error, Result};
pub use export::export_csv;
pub use import::{ImportOptions, ImportReport, import_locations, import_observations};
pub use profile::{ColumnMatch, ImportProfile, TimestampFormat};
