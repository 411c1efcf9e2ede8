//! Handlers for `/locations`.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/locations` | Optional `since`, `until`, `limit` |
//! | `POST` | `/locations` | URL-encoded [`LocationForm`]; all three names required |

use std::sync::Arc;

use axum::{
  Form, Json,
  extract::{Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use sensorlog_core::{
  observation::{LocationRow, NewLocationEntry},
  store::{HistoryQuery, ObservationStore},
};
use serde::Deserialize;

use crate::{
  error::ApiError,
  observations::{WriteResponse, required, timestamp},
};

/// `GET /locations[?since=..][&until=..][&limit=..]`
pub async fn list<S>(
  State(store): State<Arc<S>>,
  Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<LocationRow>>, ApiError>
where
  S: ObservationStore,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let rows = store.location_history(&query).await.map_err(ApiError::store)?;
  Ok(Json(rows))
}

#[derive(Debug, Default, Deserialize)]
pub struct LocationForm {
  pub location_name: Option<String>,
  pub position_name: Option<String>,
  pub status_name:   Option<String>,
  pub timestamp:     Option<String>,
}

impl LocationForm {
  pub fn into_entry(self) -> Result<NewLocationEntry, ApiError> {
    Ok(NewLocationEntry {
      location:  required("location_name", self.location_name)?,
      position:  required("position_name", self.position_name)?,
      status:    required("status_name", self.status_name)?,
      timestamp: timestamp(self.timestamp)?,
    })
  }
}

/// `POST /locations` records a location/position/status transition.
pub async fn create<S>(
  State(store): State<Arc<S>>,
  Form(form): Form<LocationForm>,
) -> Result<impl IntoResponse, ApiError>
where
  S: ObservationStore,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let entry = form.into_entry()?;
  tracing::info!(
    location = %entry.location,
    position = %entry.position,
    status = %entry.status,
    "location update"
  );

  let outcome = store.record_location(entry).await.map_err(ApiError::store)?;
  store.flush().await.map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(WriteResponse { outcome })))
}
