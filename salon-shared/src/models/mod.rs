pub mod events;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::pii::Masked;
use crate::time::WallTime;

pub use events::{SlotEvent, SlotEventKind};

/// One bookable unit of time for a (stylist, service) pair.
///
/// `stylist_id == None` marks an unassigned slot; the store resolves a
/// concrete stylist when it is reserved.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Slot {
    pub id: Uuid,
    pub date: NaiveDate,
    pub start_time: WallTime,
    pub end_time: WallTime,
    pub stylist_id: Option<String>,
    pub service_id: String,
    pub capacity: u32,
    pub remaining: u32,
    pub is_open: bool,
}

impl Slot {
    pub fn is_bookable(&self) -> bool {
        self.is_open && self.remaining > 0
    }

    /// `0 <= remaining <= capacity`
    pub fn capacity_consistent(&self) -> bool {
        self.remaining <= self.capacity
    }
}

/// Stylist filter or request: a concrete stylist or "any available".
///
/// Serialized as a plain string; `"any"` and `""` both mean [`StylistChoice::Any`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StylistChoice {
    #[default]
    Any,
    Specific(String),
}

impl StylistChoice {
    pub fn specific(&self) -> Option<&str> {
        match self {
            StylistChoice::Any => None,
            StylistChoice::Specific(id) => Some(id),
        }
    }

    pub fn matches(&self, stylist_id: Option<&str>) -> bool {
        match self {
            StylistChoice::Any => true,
            StylistChoice::Specific(id) => stylist_id == Some(id.as_str()),
        }
    }
}

impl From<String> for StylistChoice {
    fn from(raw: String) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("any") {
            StylistChoice::Any
        } else {
            StylistChoice::Specific(trimmed.to_string())
        }
    }
}

impl From<StylistChoice> for String {
    fn from(choice: StylistChoice) -> Self {
        match choice {
            StylistChoice::Any => "any".to_string(),
            StylistChoice::Specific(id) => id,
        }
    }
}

impl From<Option<String>> for StylistChoice {
    fn from(id: Option<String>) -> Self {
        id.map(StylistChoice::from).unwrap_or_default()
    }
}

impl fmt::Display for StylistChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StylistChoice::Any => write!(f, "any"),
            StylistChoice::Specific(id) => write!(f, "{}", id),
        }
    }
}

const VIRTUAL_PREFIX: &str = "virtual";

/// Reference to a slot carried in links: either a stored slot or a
/// synthesized ("virtual") time with no slot document behind it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotRef {
    Real(Uuid),
    Virtual {
        date: NaiveDate,
        start_time: WallTime,
        stylist_id: Option<String>,
        service_id: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid slot reference: {0:?}")]
pub struct ParseSlotRefError(pub String);

impl FromStr for SlotRef {
    type Err = ParseSlotRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseSlotRefError(s.to_string());
        let mut parts = s.split('|');
        if parts.next() != Some(VIRTUAL_PREFIX) {
            return Uuid::parse_str(s.trim()).map(SlotRef::Real).map_err(|_| invalid());
        }

        let date = parts
            .next()
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            .ok_or_else(invalid)?;
        let start_time = parts
            .next()
            .and_then(|t| t.parse::<WallTime>().ok())
            .ok_or_else(invalid)?;
        let stylist_id = StylistChoice::from(parts.next().unwrap_or_default().to_string())
            .specific()
            .map(str::to_string);
        let service_id = parts
            .next()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Ok(SlotRef::Virtual { date, start_time, stylist_id, service_id })
    }
}

impl fmt::Display for SlotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotRef::Real(id) => write!(f, "{}", id),
            SlotRef::Virtual { date, start_time, stylist_id, service_id } => write!(
                f,
                "{}|{}|{}|{}|{}",
                VIRTUAL_PREFIX,
                date.format("%Y-%m-%d"),
                start_time,
                stylist_id.as_deref().unwrap_or("any"),
                service_id.as_deref().unwrap_or_default()
            ),
        }
    }
}

/// Exclusive, time-boxed claim on one unit of a slot's remaining capacity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Hold {
    pub hold_id: Uuid,
    pub slot_id: Uuid,
    pub service_id: String,
    /// Always concrete; "any" is resolved by the store at issuance.
    pub stylist_id: String,
    pub date: NaiveDate,
    pub start: WallTime,
    pub end: WallTime,
    pub expires_at: DateTime<Utc>,
}

impl Hold {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Time left before expiry, zero once expired.
    pub fn time_left(&self, now: DateTime<Utc>) -> chrono::Duration {
        (self.expires_at - now).max(chrono::Duration::zero())
    }
}

/// Contact details supplied when confirming a booking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Customer {
    pub name: String,
    pub email: Masked<String>,
    #[serde(default)]
    pub phone: Option<Masked<String>>,
    #[serde(default)]
    pub service_name: Option<String>,
    #[serde(default)]
    pub stylist_name: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl Customer {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: Masked(email.into()),
            ..Default::default()
        }
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(Masked(phone.into()));
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Confirmed,
}

/// Durable outcome of redeeming a hold.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Booking {
    pub id: Uuid,
    pub hold_id: Uuid,
    pub customer: Customer,
    pub service_id: String,
    pub stylist_id: String,
    pub date: NaiveDate,
    pub start_time: WallTime,
    pub end_time: WallTime,
    pub status: BookingStatus,
    pub slot_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    pub fn from_hold(hold: &Hold, customer: Customer, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            hold_id: hold.hold_id,
            customer,
            service_id: hold.service_id.clone(),
            stylist_id: hold.stylist_id.clone(),
            date: hold.date,
            start_time: hold.start,
            end_time: hold.end,
            status: BookingStatus::Confirmed,
            slot_id: Some(hold.slot_id),
            created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceInfo {
    pub id: String,
    pub name: String,
    pub duration_minutes: u32,
    pub price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StylistInfo {
    pub id: String,
    pub name: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}
