use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Json, Router,
};
use chrono::{Duration, NaiveDate};
use futures_util::stream::{Stream, StreamExt};
use salon_core::{Availability, AvailabilityReader, DateRange};
use salon_shared::StylistChoice;
use serde::Deserialize;
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub from: NaiveDate,
    /// Inclusive; defaults to a week from `from`.
    pub to: Option<NaiveDate>,
    pub stylist: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NextQuery {
    pub from: NaiveDate,
    pub stylist: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/availability", get(read_availability))
        .route("/v1/availability/next", get(next_available_week))
        .route("/v1/availability/{date}/stream", get(stream_slot_events))
}

async fn read_availability(
    State(state): State<AppState>,
    Query(q): Query<AvailabilityQuery>,
) -> Result<Json<Availability>, AppError> {
    let range = DateRange::new(q.from, q.to.unwrap_or(q.from + Duration::days(6)))?;
    range.ensure_max_len(state.availability.max_range_days)?;

    let reader = AvailabilityReader::new(state.store.clone());
    let availability = reader.read(range, &StylistChoice::from(q.stylist)).await?;
    Ok(Json(availability))
}

/// First week from `from` with anything bookable, or `null`.
async fn next_available_week(
    State(state): State<AppState>,
    Query(q): Query<NextQuery>,
) -> Result<Json<Option<Availability>>, AppError> {
    let reader = AvailabilityReader::new(state.store.clone());
    let week = reader
        .first_available_week(q.from, &StylistChoice::from(q.stylist), state.availability.jump_max_weeks)
        .await?;
    Ok(Json(week))
}

/// Live capacity changes for one day. Lagged subscribers skip missed events.
async fn stream_slot_events(
    State(state): State<AppState>,
    Path(date): Path<NaiveDate>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.sse_tx.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(move |result| async move {
        match result {
            Ok(event) if event.date == date => Event::default()
                .event(event.kind.as_str())
                .json_data(&event)
                .ok()
                .map(Ok::<_, Infallible>),
            _ => None,
        }
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}
