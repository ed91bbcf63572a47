use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use super::Slot;

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SlotEventKind {
    HoldPlaced,
    BookingConfirmed,
    SlotUpdated,
    SlotDeleted,
}

impl SlotEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotEventKind::HoldPlaced => "hold_placed",
            SlotEventKind::BookingConfirmed => "booking_confirmed",
            SlotEventKind::SlotUpdated => "slot_updated",
            SlotEventKind::SlotDeleted => "slot_deleted",
        }
    }
}

/// Capacity change on one slot, pushed to availability subscribers.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq, Eq)]
pub struct SlotEvent {
    pub kind: SlotEventKind,
    pub slot_id: Uuid,
    pub date: NaiveDate,
    pub remaining: Option<u32>,
    pub is_open: Option<bool>,
    pub timestamp: i64,
}

impl SlotEvent {
    pub fn for_slot(kind: SlotEventKind, slot: &Slot, at: DateTime<Utc>) -> Self {
        Self {
            kind,
            slot_id: slot.id,
            date: slot.date,
            remaining: Some(slot.remaining),
            is_open: Some(slot.is_open),
            timestamp: at.timestamp_millis(),
        }
    }

    pub fn deleted(slot: &Slot, at: DateTime<Utc>) -> Self {
        Self {
            kind: SlotEventKind::SlotDeleted,
            slot_id: slot.id,
            date: slot.date,
            remaining: None,
            is_open: None,
            timestamp: at.timestamp_millis(),
        }
    }
}
