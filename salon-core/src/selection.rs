use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use salon_shared::{Slot, SlotRef, StylistChoice, WallTime};

use crate::store::ReservationStore;
use crate::{BookingError, CoreResult};

/// What the customer currently has picked, as raw form values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub service_id: String,
    /// Stylist id, or `"any"`.
    pub stylist_id: String,
    /// `YYYY-MM-DD`
    pub date: String,
    /// `HH:MM`
    pub start: String,
}

/// A validated selection, ready to be sent to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveRequest {
    pub service_id: String,
    pub stylist: StylistChoice,
    pub date: NaiveDate,
    pub start: WallTime,
}

impl Selection {
    pub fn new(
        service_id: impl Into<String>,
        stylist_id: impl Into<String>,
        date: impl Into<String>,
        start: impl Into<String>,
    ) -> Self {
        Self {
            service_id: service_id.into(),
            stylist_id: stylist_id.into(),
            date: date.into(),
            start: start.into(),
        }
    }

    /// Selection that targets an existing slot document.
    pub fn from_slot(slot: &Slot) -> Self {
        Self {
            service_id: slot.service_id.clone(),
            stylist_id: String::from(StylistChoice::from(slot.stylist_id.clone())),
            date: slot.date.format("%Y-%m-%d").to_string(),
            start: slot.start_time.to_string(),
        }
    }

    /// Resolves a link-carried slot reference into a selection.
    ///
    /// `Real` references read the slot document; `Virtual` ones carry their
    /// own fields and are still reserved through the normal capacity path.
    pub async fn resolve(slot_ref: &SlotRef, store: &dyn ReservationStore) -> CoreResult<Self> {
        match slot_ref {
            SlotRef::Real(id) => {
                let slot = store
                    .read_slot(*id)
                    .await?
                    .ok_or(BookingError::SlotNoLongerAvailable)?;
                Ok(Self::from_slot(&slot))
            }
            SlotRef::Virtual { date, start_time, stylist_id, service_id } => Ok(Self {
                service_id: service_id.clone().unwrap_or_default(),
                stylist_id: String::from(StylistChoice::from(stylist_id.clone())),
                date: date.format("%Y-%m-%d").to_string(),
                start: start_time.to_string(),
            }),
        }
    }

    pub fn validate(&self) -> CoreResult<ReserveRequest> {
        let service_id = required("service", &self.service_id)?;
        let stylist = required("stylist", &self.stylist_id)?;
        let date = required("date", &self.date)?;
        let start = required("start time", &self.start)?;

        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|_| BookingError::InvalidSelection(format!("date {:?} is not YYYY-MM-DD", date)))?;
        let start = start
            .parse::<WallTime>()
            .map_err(|e| BookingError::InvalidSelection(e.to_string()))?;

        Ok(ReserveRequest {
            service_id: service_id.to_string(),
            stylist: StylistChoice::from(stylist.to_string()),
            date,
            start,
        })
    }
}

fn required<'a>(field: &str, value: &'a str) -> CoreResult<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(BookingError::InvalidSelection(format!("{} is required", field)));
    }
    Ok(trimmed)
}
