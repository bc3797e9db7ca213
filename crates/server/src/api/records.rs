use axum::{
    extract::{Path as AxumPath, State},
    Json,
};
use common::Record;
use library::NewRecord;

use crate::state::{AppState, JsonResult};
use crate::utils::catalog_error;

pub async fn create_record(
    State(state): State<AppState>,
    Json(payload): Json<NewRecord>,
) -> JsonResult<Record> {
    let record = state
        .catalog
        .ensure_record(payload)
        .await
        .map_err(catalog_error)?;
    Ok(Json(record))
}

pub async fn get_record(
    State(state): State<AppState>,
    AxumPath(record_id): AxumPath<String>,
) -> JsonResult<Record> {
    let record = state.catalog.get_record(&record_id).map_err(catalog_error)?;
    Ok(Json(record))
}
