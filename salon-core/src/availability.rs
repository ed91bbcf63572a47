use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use salon_shared::{Slot, StylistChoice};
use tracing::debug;

use crate::store::ReservationStore;
use crate::{BookingError, CoreResult};

/// Inclusive range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> CoreResult<Self> {
        if to < from {
            return Err(BookingError::InvalidSelection(format!(
                "date range ends ({}) before it starts ({})",
                to, from
            )));
        }
        Ok(Self { from, to })
    }

    /// Monday to Sunday of the week containing `date`.
    pub fn week_of(date: NaiveDate) -> Self {
        let from = week_start(date);
        Self { from, to: from + Duration::days(6) }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }

    pub fn len_days(&self) -> i64 {
        (self.to - self.from).num_days() + 1
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let from = self.from;
        (0..self.len_days()).map(move |i| from + Duration::days(i))
    }

    /// Rejects ranges longer than `max_days`.
    pub fn ensure_max_len(&self, max_days: i64) -> CoreResult<()> {
        if self.len_days() > max_days {
            return Err(BookingError::InvalidSelection(format!(
                "date range spans {} days, at most {} allowed",
                self.len_days(),
                max_days
            )));
        }
        Ok(())
    }
}

/// Monday on or before `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

/// Bookable slots per day, ascending by start time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Availability {
    pub range: DateRange,
    pub days: BTreeMap<NaiveDate, Vec<Slot>>,
}

impl Availability {
    /// Keeps open, non-exhausted slots inside `range`. Every day in the range
    /// gets an entry; an empty entry means "no availability".
    pub fn project(range: DateRange, slots: Vec<Slot>) -> Self {
        let mut days: BTreeMap<NaiveDate, Vec<Slot>> = range.days().map(|d| (d, Vec::new())).collect();
        for slot in slots.into_iter().filter(|s| s.is_bookable() && range.contains(s.date)) {
            if let Some(day) = days.get_mut(&slot.date) {
                day.push(slot);
            }
        }
        for day in days.values_mut() {
            // stable: equal start times keep store order
            day.sort_by_key(|s| s.start_time);
        }
        Self { range, days }
    }

    pub fn for_date(&self, date: NaiveDate) -> &[Slot] {
        self.days.get(&date).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.days.values().all(Vec::is_empty)
    }

    pub fn total_slots(&self) -> usize {
        self.days.values().map(Vec::len).sum()
    }
}

/// Read path over slot documents; never mutates.
pub struct AvailabilityReader {
    store: Arc<dyn ReservationStore>,
}

impl AvailabilityReader {
    pub fn new(store: Arc<dyn ReservationStore>) -> Self {
        Self { store }
    }

    pub async fn read(&self, range: DateRange, stylist: &StylistChoice) -> CoreResult<Availability> {
        let slots = self.store.read_slots(&range, stylist).await?;
        let slots = slots.into_iter().filter(|s| stylist.matches(s.stylist_id.as_deref())).collect();
        Ok(Availability::project(range, slots))
    }

    /// First week, starting with the one containing `from`, that has any
    /// availability. Looks at most `max_weeks` weeks ahead.
    pub async fn first_available_week(
        &self,
        from: NaiveDate,
        stylist: &StylistChoice,
        max_weeks: u32,
    ) -> CoreResult<Option<Availability>> {
        let mut week = DateRange::week_of(from);
        for _ in 0..max_weeks {
            let availability = self.read(week, stylist).await?;
            if !availability.is_empty() {
                return Ok(Some(availability));
            }
            debug!("No availability in week starting {}, moving on", week.from);
            week = DateRange::week_of(week.from + Duration::days(7));
        }
        Ok(None)
    }
}
