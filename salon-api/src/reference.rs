use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use salon_shared::{ServiceInfo, StylistInfo};

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/services/{id}", get(get_service))
        .route("/v1/stylists/{id}", get(get_stylist))
}

async fn get_service(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<ServiceInfo>, AppError> {
    state
        .store
        .read_service(&id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Service {} not found", id)))
}

async fn get_stylist(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<StylistInfo>, AppError> {
    state
        .store
        .read_stylist(&id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Stylist {} not found", id)))
}
