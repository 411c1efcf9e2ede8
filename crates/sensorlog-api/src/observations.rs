//! Handlers for `/observations` (and the legacy `/new_observation` form
//! target).
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/observations` | Optional `since`, `until`, `source`, `limit`, `offset` |
//! | `POST` | `/observations` | URL-encoded [`ObservationForm`]; 201 + write outcome |

use std::sync::Arc;

use axum::{
  Form, Json,
  extract::{Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use sensorlog_core::{
  observation::{NewObservation, ObservationRow, WriteOutcome},
  store::{ObservationQuery, ObservationStore},
};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

// ─── Form helpers ────────────────────────────────────────────────────────────

/// Blank form fields are treated as absent.
pub(crate) fn optional(value: Option<String>) -> Option<String> {
  value
    .map(|v| v.trim().to_owned())
    .filter(|v| !v.is_empty())
}

pub(crate) fn required(field: &str, value: Option<String>) -> Result<String, ApiError> {
  optional(value).ok_or_else(|| ApiError::BadRequest(format!("{field} is required")))
}

pub(crate) fn number(field: &str, raw: &str) -> Result<f64, ApiError> {
  raw
    .parse::<f64>()
    .ok()
    .filter(|v| v.is_finite())
    .ok_or_else(|| ApiError::BadRequest(format!("{field} is not a number: {raw:?}")))
}

pub(crate) fn timestamp(raw: Option<String>) -> Result<Option<f64>, ApiError> {
  optional(raw).map(|t| number("timestamp", &t)).transpose()
}

#[derive(Debug, Serialize)]
pub struct WriteResponse {
  pub outcome: WriteOutcome,
}

// ─── List ────────────────────────────────────────────────────────────────────

/// `GET /observations[?since=..][&until=..][&source=..][&limit=..][&offset=..]`
pub async fn list<S>(
  State(store): State<Arc<S>>,
  Query(query): Query<ObservationQuery>,
) -> Result<Json<Vec<ObservationRow>>, ApiError>
where
  S: ObservationStore,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let rows = store.observations(&query).await.map_err(ApiError::store)?;
  Ok(Json(rows))
}

// ─── Create ──────────────────────────────────────────────────────────────────

/// Form fields accepted by `POST /observations`. Everything arrives as text
/// so that blank and malformed values can be told apart and rejected here.
#[derive(Debug, Default, Deserialize)]
pub struct ObservationForm {
  pub source_name:   Option<String>,
  pub value:         Option<String>,
  pub location_name: Option<String>,
  pub position_name: Option<String>,
  pub status_name:   Option<String>,
  /// Unix seconds; defaults to the time of the request.
  pub timestamp:     Option<String>,
  pub notes:         Option<String>,
}

impl ObservationForm {
  pub fn into_observation(self) -> Result<NewObservation, ApiError> {
    let source = required("source_name", self.source_name)?;
    let value = number("value", &required("value", self.value)?)?;

    Ok(NewObservation {
      source,
      value,
      location: optional(self.location_name),
      position: optional(self.position_name),
      status: optional(self.status_name),
      timestamp: timestamp(self.timestamp)?,
      notes: optional(self.notes),
    })
  }
}

/// `POST /observations` records one manual observation and commits it.
pub async fn create<S>(
  State(store): State<Arc<S>>,
  Form(form): Form<ObservationForm>,
) -> Result<impl IntoResponse, ApiError>
where
  S: ObservationStore,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let observation = form.into_observation()?;
  tracing::info!(source = %observation.source, value = observation.value, "manual observation");

  let outcome = store.record(observation).await.map_err(ApiError::store)?;
  store.flush().await.map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(WriteResponse { outcome })))
}
