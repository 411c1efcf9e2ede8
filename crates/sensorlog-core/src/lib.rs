//! Core types and trait definitions for the sensorlog observation store.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! Storage backends implement [`store::ObservationStore`]; ingestion and
//! export tooling depend on that trait rather than on a concrete backend.

#![allow(async_fn_in_trait)]

pub mod category;
pub mod error;
pub mod observation;
pub mod store;

pub use category::Category;
pub use error::{Error, Result};
