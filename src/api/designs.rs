//! Design sharing endpoints

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::Serialize;

use super::{ApiError, ApiState};
use crate::Error;
use crate::db::{Design, DesignQuery, NewDesign};

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

/// Build designs router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/designs", post(create_design).get(list_designs))
        .route(
            "/api/designs/{id}",
            get(get_design).put(update_design).delete(delete_design),
        )
        .route("/api/designs/{id}/download", post(download_design))
        .with_state(state)
}

fn not_found(id: &str) -> ApiError {
    Error::NotFound(format!("design {id}")).into()
}

async fn create_design(
    State(state): State<Arc<ApiState>>,
    Json(design): Json<NewDesign>,
) -> Result<(StatusCode, Json<Design>), ApiError> {
    let created = state.designs.create(&design)?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn list_designs(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<DesignQuery>,
) -> Result<Json<Vec<Design>>, ApiError> {
    Ok(Json(state.designs.list(&query)?))
}

async fn get_design(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<Json<Design>, ApiError> {
    state
        .designs
        .get(&id)?
        .map(Json)
        .ok_or_else(|| not_found(&id))
}

async fn update_design(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
    Json(design): Json<NewDesign>,
) -> Result<Json<Design>, ApiError> {
    state
        .designs
        .update(&id, &design)?
        .map(Json)
        .ok_or_else(|| not_found(&id))
}

async fn delete_design(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    if !state.designs.delete(&id)? {
        return Err(not_found(&id));
    }
    Ok(Json(MessageResponse {
        message: "Design deleted successfully",
    }))
}

async fn download_design(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    if !state.designs.increment_downloads(&id)? {
        return Err(not_found(&id));
    }
    Ok(Json(MessageResponse {
        message: "Download count incremented",
    }))
}
