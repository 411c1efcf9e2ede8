//! Handler for `GET /names/{category}`.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
};
use sensorlog_core::{Category, observation::NameRecord, store::ObservationStore};

use crate::error::ApiError;

/// `GET /names/{category}`, where `category` is `source`, `location`, `position`
/// or `status` (table names are accepted too).
pub async fn list<S>(
  State(store): State<Arc<S>>,
  Path(category): Path<String>,
) -> Result<Json<Vec<NameRecord>>, ApiError>
where
  S: ObservationStore,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let category =
    Category::parse(&category).map_err(|e| ApiError::NotFound(e.to_string()))?;
  let names = store.names(category).await.map_err(ApiError::store)?;
  Ok(Json(names))
}
