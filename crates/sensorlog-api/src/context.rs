//! Handler for `GET /context?timestamp=<unix seconds>`.
//!
//! `200` with `context` set to `null` when nothing was recorded before the
//! given instant; `400` when `timestamp` is missing or not a finite number.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Query, State},
};
use sensorlog_core::{observation::Context, store::ObservationStore};
use serde::{Deserialize, Serialize};

use crate::{error::ApiError, observations};

/// Kept as text so a bad value gets the JSON error body.
#[derive(Debug, Deserialize)]
pub struct ContextParams {
  pub timestamp: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ContextResponse {
  pub timestamp: f64,
  pub context:   Option<Context>,
}

pub async fn handler<S>(
  State(store): State<Arc<S>>,
  Query(params): Query<ContextParams>,
) -> Result<Json<ContextResponse>, ApiError>
where
  S: ObservationStore,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let timestamp = observations::timestamp(params.timestamp)?
    .ok_or_else(|| ApiError::BadRequest("timestamp is required".into()))?;
  let context = store
    .resolve_context(timestamp)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(ContextResponse { timestamp, context }))
}
