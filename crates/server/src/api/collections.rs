use axum::{
    extract::{Path as AxumPath, State},
    http::StatusCode,
    Extension, Json,
};
use common::Collection;
use serde::Serialize;
use serde_json::Value;

use crate::cache::{collection_key, collections_key, invalidate_collection};
use crate::state::{
    AddRecordRequest, AddRecordResponse, AppState, AuthContext, CollectionView,
    CreateCollectionRequest, JsonResult, StatusResponse, UpdateCollectionRequest,
};
use crate::utils::{catalog_error, json_error};

pub async fn list_collections(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> JsonResult<Value> {
    let owner = ctx.user.id.as_str();
    let key = collections_key(owner);
    if let Some(cached) = state.cache.get(&key) {
        return Ok(Json(cached));
    }
    let collections = state.catalog.list_collections(owner).map_err(catalog_error)?;
    cache_response(&state, &key, &collections)
}

pub async fn create_collection(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(payload): Json<CreateCollectionRequest>,
) -> JsonResult<Collection> {
    let collection = state
        .catalog
        .create_collection(&ctx.user.id, &payload.name)
        .map_err(catalog_error)?;
    state.cache.delete(&collections_key(&ctx.user.id));
    Ok(Json(collection))
}

pub async fn get_collection(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    AxumPath(collection_id): AxumPath<String>,
) -> JsonResult<Value> {
    let owner = ctx.user.id.as_str();
    let key = collection_key(owner, &collection_id);
    if let Some(cached) = state.cache.get(&key) {
        return Ok(Json(cached));
    }
    let collection = state
        .catalog
        .get_collection(owner, &collection_id)
        .map_err(catalog_error)?;
    let view = collection_view(&state, collection)?;
    cache_response(&state, &key, &view)
}

pub async fn update_collection(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    AxumPath(collection_id): AxumPath<String>,
    Json(payload): Json<UpdateCollectionRequest>,
) -> JsonResult<CollectionView> {
    let collection = state
        .catalog
        .rename_collection(&ctx.user.id, &collection_id, &payload.name)
        .map_err(catalog_error)?;
    invalidate_collection(state.cache.as_ref(), &ctx.user.id, &collection_id);
    Ok(Json(collection_view(&state, collection)?))
}

pub async fn delete_collection(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    AxumPath(collection_id): AxumPath<String>,
) -> JsonResult<StatusResponse> {
    state
        .catalog
        .delete_collection(&ctx.user.id, &collection_id)
        .map_err(catalog_error)?;
    invalidate_collection(state.cache.as_ref(), &ctx.user.id, &collection_id);
    Ok(Json(StatusResponse::ok()))
}

/// Adds a stored record by id, or ingests the payload first when no id is
/// given.
pub async fn add_record(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    AxumPath(collection_id): AxumPath<String>,
    Json(payload): Json<AddRecordRequest>,
) -> JsonResult<AddRecordResponse> {
    let owner = ctx.user.id.as_str();
    // Check ownership before ingesting anything.
    state
        .catalog
        .get_collection(owner, &collection_id)
        .map_err(catalog_error)?;

    let record_id = match payload.record_id.filter(|id| !id.trim().is_empty()) {
        Some(record_id) => record_id.trim().to_string(),
        None => {
            state
                .catalog
                .ensure_record(payload.record)
                .await
                .map_err(catalog_error)?
                .id
        }
    };

    let outcome = state
        .catalog
        .add_record(owner, &collection_id, &record_id)
        .await
        .map_err(catalog_error)?;
    if !outcome.already_exists {
        invalidate_collection(state.cache.as_ref(), owner, &collection_id);
    }
    Ok(Json(AddRecordResponse {
        collection: collection_view(&state, outcome.collection)?,
        already_exists: outcome.already_exists,
    }))
}

pub async fn remove_record(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    AxumPath((collection_id, record_id)): AxumPath<(String, String)>,
) -> JsonResult<CollectionView> {
    let collection = state
        .catalog
        .remove_record(&ctx.user.id, &collection_id, &record_id)
        .await
        .map_err(catalog_error)?;
    invalidate_collection(state.cache.as_ref(), &ctx.user.id, &collection_id);
    Ok(Json(collection_view(&state, collection)?))
}

fn collection_view(
    state: &AppState,
    collection: Collection,
) -> Result<CollectionView, (StatusCode, Json<crate::state::ErrorResponse>)> {
    let records = state
        .catalog
        .collection_records(&collection)
        .map_err(catalog_error)?;
    Ok(CollectionView::new(collection, records))
}

fn cache_response<T: Serialize>(state: &AppState, key: &str, body: &T) -> JsonResult<Value> {
    let value = serde_json::to_value(body).map_err(|err| {
        json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("serialize error: {}", err),
        )
    })?;
    state.cache.set(key, value.clone(), state.cache_ttl);
    Ok(Json(value))
}
