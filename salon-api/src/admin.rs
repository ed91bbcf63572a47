use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, post, put},
    Json, Router,
};
use chrono::NaiveDate;
use salon_catalog::WeekPlan;
use salon_shared::{ServiceInfo, Slot, SlotEvent, SlotEventKind, StylistInfo, WallTime};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateSlotRequest {
    pub date: NaiveDate,
    pub start_time: WallTime,
    pub end_time: WallTime,
    pub stylist_id: Option<String>,
    pub service_id: String,
    pub capacity: u32,
    #[serde(default = "default_open")]
    pub is_open: bool,
}

fn default_open() -> bool {
    true
}

impl CreateSlotRequest {
    fn into_slot(self) -> Result<Slot, AppError> {
        if self.service_id.trim().is_empty() {
            return Err(AppError::Validation("service_id is required".into()));
        }
        if self.end_time <= self.start_time {
            return Err(AppError::Validation(format!(
                "End time {} must be after start time {}",
                self.end_time, self.start_time
            )));
        }
        Ok(Slot {
            id: Uuid::new_v4(),
            date: self.date,
            start_time: self.start_time,
            end_time: self.end_time,
            stylist_id: self.stylist_id.filter(|s| !s.trim().is_empty() && s != "any"),
            service_id: self.service_id.trim().to_string(),
            capacity: self.capacity,
            remaining: self.capacity,
            is_open: self.is_open,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct GeneratedWeek {
    pub created: usize,
    pub slots: Vec<Slot>,
}

#[derive(Debug, Deserialize)]
pub struct CapacityRequest {
    pub capacity: u32,
}

#[derive(Debug, Deserialize)]
pub struct AdjustRequest {
    pub delta: i64,
}

#[derive(Debug, Deserialize)]
pub struct OpenRequest {
    pub is_open: bool,
}

#[derive(Debug, Deserialize)]
pub struct ServiceRequest {
    pub name: String,
    pub duration_minutes: u32,
    #[serde(default)]
    pub price: f64,
}

#[derive(Debug, Deserialize)]
pub struct StylistRequest {
    pub name: String,
    #[serde(default = "default_open")]
    pub active: bool,
}

// ============================================================================
// Routes
// ============================================================================

/// Mounted under `/v1/admin` behind the admin JWT check.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/slots", post(create_slot))
        .route("/slots/generate", post(generate_week))
        .route("/slots/{id}", delete(delete_slot))
        .route("/slots/{id}/capacity", put(set_capacity))
        .route("/slots/{id}/adjust", post(adjust_remaining))
        .route("/slots/{id}/open", put(set_open))
        .route("/services/{id}", put(upsert_service))
        .route("/stylists/{id}", put(upsert_stylist))
}

// ============================================================================
// Slot inventory
// ============================================================================

async fn generate_week(
    State(state): State<AppState>,
    Json(plan): Json<WeekPlan>,
) -> Result<(StatusCode, Json<GeneratedWeek>), AppError> {
    let slots = state.admin.create_slots(plan.build()?).await?;
    info!("Generated {} slots for week of {}", slots.len(), plan.monday());

    let now = state.clock.now();
    for slot in &slots {
        state.publish(SlotEvent::for_slot(SlotEventKind::SlotUpdated, slot, now));
    }
    Ok((StatusCode::CREATED, Json(GeneratedWeek { created: slots.len(), slots })))
}

async fn create_slot(
    State(state): State<AppState>,
    Json(req): Json<CreateSlotRequest>,
) -> Result<(StatusCode, Json<Slot>), AppError> {
    let created = state.admin.create_slots(vec![req.into_slot()?]).await?;
    let slot = created
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("store accepted a slot but returned none"))?;
    state.publish(SlotEvent::for_slot(SlotEventKind::SlotUpdated, &slot, state.clock.now()));
    Ok((StatusCode::CREATED, Json(slot)))
}

async fn set_capacity(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<CapacityRequest>,
) -> Result<Json<Slot>, AppError> {
    let slot = state.admin.set_capacity(id, req.capacity).await?;
    state.publish(SlotEvent::for_slot(SlotEventKind::SlotUpdated, &slot, state.clock.now()));
    Ok(Json(slot))
}

async fn adjust_remaining(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<AdjustRequest>,
) -> Result<Json<Slot>, AppError> {
    let slot = state.admin.adjust_remaining(id, req.delta).await?;
    state.publish(SlotEvent::for_slot(SlotEventKind::SlotUpdated, &slot, state.clock.now()));
    Ok(Json(slot))
}

async fn set_open(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<OpenRequest>,
) -> Result<Json<Slot>, AppError> {
    let slot = state.admin.set_open(id, req.is_open).await?;
    state.publish(SlotEvent::for_slot(SlotEventKind::SlotUpdated, &slot, state.clock.now()));
    Ok(Json(slot))
}

async fn delete_slot(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode, AppError> {
    let existing = state.store.read_slot(id).await?;
    state.admin.delete_slot(id).await?;
    if let Some(slot) = existing {
        state.publish(SlotEvent::deleted(&slot, state.clock.now()));
    }
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Reference data
// ============================================================================

async fn upsert_service(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ServiceRequest>,
) -> Result<Json<ServiceInfo>, AppError> {
    if req.name.trim().is_empty() {
        return Err(AppError::Validation("name is required".into()));
    }
    let service = ServiceInfo {
        id,
        name: req.name.trim().to_string(),
        duration_minutes: req.duration_minutes,
        price: req.price.max(0.0),
    };
    state.admin.upsert_service(service.clone()).await?;
    Ok(Json(service))
}

async fn upsert_stylist(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<StylistRequest>,
) -> Result<Json<StylistInfo>, AppError> {
    if req.name.trim().is_empty() {
        return Err(AppError::Validation("name is required".into()));
    }
    let stylist = StylistInfo {
        id,
        name: req.name.trim().to_string(),
        active: req.active,
    };
    state.admin.upsert_stylist(stylist.clone()).await?;
    Ok(Json(stylist))
}
