//! HTTP ingestion and read API for sensorlog.
//!
//! Exposes an axum [`Router`] backed by any
//! [`sensorlog_core::store::ObservationStore`]. Manual observations arrive as
//! URL-encoded forms; reads are JSON.
//!
//! # Mounting
//!
//! ```rust,ignore
//! let app = sensorlog_api::api_router(Arc::new(store));
//! axum::serve(listener, app).await?;
//! ```

pub mod context;
pub mod error;
pub mod locations;
pub mod names;
pub mod observations;

use std::sync::Arc;

use axum::{
  Json, Router,
  routing::{get, post},
};
use sensorlog_core::store::ObservationStore;
use tower_http::trace::TraceLayer;

pub use error::ApiError;

/// Build the API router for `store`.
pub fn api_router<S>(store: Arc<S>) -> Router<()>
where
  S: ObservationStore + Send + Sync + 'static,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  Router::new()
    .route("/", get(health))
    // Ingestion
    .route("/new_observation", post(observations::create::<S>))
    .route("/observations", get(observations::list::<S>).post(observations::create::<S>))
    .route("/locations", get(locations::list::<S>).post(locations::create::<S>))
    // Point-in-time
    .route("/context", get(context::handler::<S>))
    // Registry
    .route("/names/{category}", get(names::list::<S>))
    .layer(TraceLayer::new_for_http())
    .with_state(store)
}

/// `GET /`: liveness check.
async fn health() -> Json<bool> { Json(true) }
