//! SQLite backend for the sensorlog observation store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated
//! connection thread without blocking the async runtime. Busy retries sleep
//! on that thread.

mod durable;
mod registry;
mod schema;
mod store;

pub mod config;
pub mod error;
pub mod fallback;

pub use config::{ContextOrdering, StoreConfig};
pub use durable::WriterStats;
pub use error::{Error, Result};
pub use fallback::{ReplayReport, SpilledWrite};
pub use store::SqliteStore;
