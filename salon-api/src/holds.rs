use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, post},
    Json, Router,
};
use salon_core::{BookingError, Selection};
use salon_shared::{Hold, SlotEventKind, SlotRef};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

/// Either a link-carried slot reference or the raw form selection.
#[derive(Debug, Deserialize)]
pub struct HoldRequest {
    pub slot_ref: Option<String>,
    #[serde(default)]
    pub service_id: String,
    #[serde(default = "any_stylist")]
    pub stylist_id: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub start: String,
}

fn any_stylist() -> String {
    "any".to_string()
}

#[derive(Debug, Serialize)]
pub struct HoldResponse {
    #[serde(flatten)]
    pub hold: Hold,
    pub expires_in_seconds: i64,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/holds", post(create_hold))
        .route("/v1/holds/{id}", delete(release_hold))
}

async fn create_hold(
    State(state): State<AppState>,
    Json(req): Json<HoldRequest>,
) -> Result<(StatusCode, Json<HoldResponse>), AppError> {
    let selection = match req.slot_ref.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => {
            let slot_ref: SlotRef = raw
                .parse()
                .map_err(|e: salon_shared::models::ParseSlotRefError| BookingError::InvalidSelection(e.to_string()))?;
            Selection::resolve(&slot_ref, state.store.as_ref()).await?
        }
        None => Selection::new(req.service_id, req.stylist_id, req.date, req.start),
    };
    let request = selection.validate()?;

    let hold = state.store.reserve(&request).await?;
    state.publish_slot(SlotEventKind::HoldPlaced, hold.slot_id).await;

    let expires_in_seconds = hold.time_left(state.clock.now()).num_seconds().max(0);
    Ok((StatusCode::CREATED, Json(HoldResponse { hold, expires_in_seconds })))
}

/// Early release; unknown or finished holds are accepted silently.
async fn release_hold(State(state): State<AppState>, Path(hold_id): Path<Uuid>) -> Result<StatusCode, AppError> {
    state.store.release(hold_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
