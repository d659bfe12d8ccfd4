//! HTTP request handlers for the catalog and user services.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::service::{CatalogService, ServiceError, UserService};
use crate::store::StoreError;
use crate::types::{CatalogItem, ItemInput, ServiceRole, User, UserInput};

/// Application state shared across handlers.
pub struct AppState {
    pub role: ServiceRole,
    pub catalog: Option<CatalogService>,
    pub users: Option<UserService>,
}

impl AppState {
    fn catalog(&self) -> Result<&CatalogService, StatusCode> {
        self.catalog.as_ref().ok_or(StatusCode::NOT_FOUND)
    }

    fn users(&self) -> Result<&UserService, StatusCode> {
        self.users.as_ref().ok_or(StatusCode::NOT_FOUND)
    }
}

fn status_for(e: ServiceError) -> StatusCode {
    match e {
        ServiceError::Invalid(_) => StatusCode::BAD_REQUEST,
        ServiceError::Store(StoreError::Conflict(_)) => StatusCode::CONFLICT,
        ServiceError::Store(e) => {
            error!(error = %e, "Store request failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    role: ServiceRole,
    version: String,
}

/// Health check endpoint.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        role: state.role,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Create an item; a named confirmer triggers a confirmation request.
pub async fn create_item(
    State(state): State<Arc<AppState>>,
    Json(input): Json<ItemInput>,
) -> Result<(StatusCode, Json<CatalogItem>), StatusCode> {
    let item = state.catalog()?.create_item(input).await.map_err(status_for)?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn list_items(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<CatalogItem>>, StatusCode> {
    let items = state.catalog()?.list_items().await.map_err(status_for)?;
    Ok(Json(items))
}

pub async fn get_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<CatalogItem>, StatusCode> {
    match state.catalog()?.get_item(&id).await.map_err(status_for)? {
        Some(item) => Ok(Json(item)),
        None => Err(StatusCode::NOT_FOUND),
    }
}

pub async fn update_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(input): Json<ItemInput>,
) -> Result<Json<CatalogItem>, StatusCode> {
    match state.catalog()?.update_item(&id, input).await.map_err(status_for)? {
        Some(item) => Ok(Json(item)),
        None => Err(StatusCode::NOT_FOUND),
    }
}

pub async fn delete_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, StatusCode> {
    if state.catalog()?.delete_item(&id).await.map_err(status_for)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(input): Json<UserInput>,
) -> Result<(StatusCode, Json<User>), StatusCode> {
    let user = state.users()?.create_user(input).await.map_err(status_for)?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn list_users(State(state): State<Arc<AppState>>) -> Result<Json<Vec<User>>, StatusCode> {
    let users = state.users()?.list_users().await.map_err(status_for)?;
    Ok(Json(users))
}

pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<User>, StatusCode> {
    match state.users()?.get_user(&id).await.map_err(status_for)? {
        Some(user) => Ok(Json(user)),
        None => Err(StatusCode::NOT_FOUND),
    }
}
