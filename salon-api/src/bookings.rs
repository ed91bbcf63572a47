use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use salon_core::validate_contact;
use salon_shared::{Booking, Customer, SlotEventKind};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub hold_id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub notes: Option<String>,
}

impl ConfirmRequest {
    fn customer(&self) -> Customer {
        let mut customer = Customer::new(self.name.trim(), self.email.trim());
        if let Some(phone) = self.phone.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
            customer = customer.with_phone(phone);
        }
        customer.notes = self.notes.clone().filter(|n| !n.trim().is_empty());
        customer
    }
}

#[derive(Debug, Serialize)]
pub struct BookingResponse {
    pub booking_id: Uuid,
    pub booking: Option<Booking>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings", post(confirm_booking))
        .route("/v1/bookings/{id}", get(get_booking))
}

/// Redeems a hold. Never retried here; a 503 leaves the outcome to be
/// checked by reading the booking or re-selecting.
///
/// Once the store has committed the booking the response is always 201 with
/// its id. The read-back that fills in `booking` is best-effort.
async fn confirm_booking(
    State(state): State<AppState>,
    Json(req): Json<ConfirmRequest>,
) -> Result<(StatusCode, Json<BookingResponse>), AppError> {
    let customer = req.customer();
    validate_contact(&customer)?;

    let booking_id = state.store.redeem(req.hold_id, &customer).await?;
    info!("Booking {} confirmed from hold {}", booking_id, req.hold_id);

    let booking = match state.store.read_booking(booking_id).await {
        Ok(booking) => booking,
        Err(e) => {
            warn!("Booking {} committed but could not be read back: {}", booking_id, e);
            None
        }
    };
    if let Some(slot_id) = booking.as_ref().and_then(|b| b.slot_id) {
        state.publish_slot(SlotEventKind::BookingConfirmed, slot_id).await;
    }
    Ok((StatusCode::CREATED, Json(BookingResponse { booking_id, booking })))
}

async fn get_booking(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Booking>, AppError> {
    state
        .store
        .read_booking(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Booking {} not found", id)))
}
