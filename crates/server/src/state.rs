use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::Json;
use common::{Collection, Record};
use library::{Catalog, NewRecord};
use serde::{Deserialize, Serialize};

use crate::auth::{AuthStore, AuthUser};
use crate::cache::ResponseCache;

#[derive(Clone)]
pub struct AppState {
    pub auth: AuthStore,
    pub catalog: Catalog,
    pub cache: Arc<dyn ResponseCache>,
    pub cache_ttl: Duration,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Acknowledgement for mutations that have no resource to return.
#[derive(Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

impl StatusResponse {
    pub fn ok() -> Self {
        Self { status: "ok" }
    }
}

#[derive(Clone)]
pub struct AuthContext {
    pub user: AuthUser,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: u64,
    pub token_type: &'static str,
}

#[derive(Serialize)]
pub struct UserResponse {
    pub id: String,
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateCollectionRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCollectionRequest {
    pub name: String,
}

/// Either a reference to a stored record or a full ingestion payload.
#[derive(Debug, Deserialize)]
pub struct AddRecordRequest {
    #[serde(default)]
    pub record_id: Option<String>,
    #[serde(flatten)]
    pub record: NewRecord,
}

/// A collection with its record ids resolved, in collection order.
#[derive(Serialize)]
pub struct CollectionView {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub genre: Vec<Option<String>>,
    pub mood: Vec<Option<String>>,
    pub records: Vec<Record>,
    pub owner: String,
    pub created_at: u64,
    pub updated_at: u64,
}

impl CollectionView {
    pub fn new(collection: Collection, records: Vec<Record>) -> Self {
        Self {
            id: collection.id,
            name: collection.name,
            description: collection.description,
            genre: collection.genre,
            mood: collection.mood,
            records,
            owner: collection.owner,
            created_at: collection.created_at,
            updated_at: collection.updated_at,
        }
    }
}

#[derive(Serialize)]
pub struct AddRecordResponse {
    pub collection: CollectionView,
    pub already_exists: bool,
}

pub type JsonResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;
