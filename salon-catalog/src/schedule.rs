use chrono::{Datelike, Duration, NaiveDate, Weekday};
use salon_shared::{Slot, WallTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Longest slot an admin can generate: one full day.
pub const MAX_INTERVAL_MINUTES: u32 = 24 * 60;

/// Fields shared by every generated slot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SlotTemplate {
    pub stylist_id: Option<String>,
    pub service_id: String,
    pub capacity: u32,
    /// Generate slots open for booking, or closed until an admin opens them.
    #[serde(default = "default_open")]
    pub open: bool,
}

fn default_open() -> bool {
    true
}

impl SlotTemplate {
    fn instantiate(&self, date: NaiveDate, start: WallTime, end: WallTime) -> Slot {
        Slot {
            id: Uuid::new_v4(),
            date,
            start_time: start,
            end_time: end,
            stylist_id: self.stylist_id.clone(),
            service_id: self.service_id.clone(),
            capacity: self.capacity,
            remaining: self.capacity,
            is_open: self.open,
        }
    }
}

/// Back-to-back slots from `open` until `close`.
///
/// The last slot is shortened to end at `close`. Returns nothing when
/// `close <= open` or `interval_minutes == 0`.
pub fn daily_slots(
    date: NaiveDate,
    open: WallTime,
    close: WallTime,
    interval_minutes: u32,
    template: &SlotTemplate,
) -> Vec<Slot> {
    if close <= open || interval_minutes == 0 {
        return Vec::new();
    }
    let close_min = close.minutes() as u32;
    let mut slots = Vec::new();
    let mut t = open.minutes() as u32;
    while t < close_min {
        let end = t.saturating_add(interval_minutes).min(close_min);
        // both bounds are below close, which is a valid time of day
        if let (Some(start), Some(end)) = (WallTime::from_minutes(t as u16), WallTime::from_minutes(end as u16)) {
            slots.push(template.instantiate(date, start, end));
        }
        t = t.saturating_add(interval_minutes);
    }
    slots
}

/// Admin "generate week" request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeekPlan {
    /// Any day of the target week; generation starts on its Monday.
    pub week_of: NaiveDate,
    pub open: WallTime,
    pub close: WallTime,
    pub interval_minutes: u32,
    pub weekdays: Vec<Weekday>,
    #[serde(flatten)]
    pub template: SlotTemplate,
}

impl WeekPlan {
    pub fn monday(&self) -> NaiveDate {
        self.week_of - Duration::days(self.week_of.weekday().num_days_from_monday() as i64)
    }

    pub fn validate(&self) -> Result<(), ScheduleError> {
        if self.template.service_id.trim().is_empty() {
            return Err(ScheduleError::MissingField("service_id"));
        }
        if matches!(&self.template.stylist_id, Some(id) if id.trim().is_empty()) {
            return Err(ScheduleError::MissingField("stylist_id"));
        }
        if self.interval_minutes == 0 || self.interval_minutes > MAX_INTERVAL_MINUTES {
            return Err(ScheduleError::InvalidInterval);
        }
        if self.close <= self.open {
            return Err(ScheduleError::EndBeforeStart { open: self.open, close: self.close });
        }
        if self.weekdays.is_empty() {
            return Err(ScheduleError::NoWeekdays);
        }
        Ok(())
    }

    /// All slots of the plan, in date then start-time order.
    pub fn build(&self) -> Result<Vec<Slot>, ScheduleError> {
        self.validate()?;
        let monday = self.monday();
        let slots = (0..7)
            .map(|offset| monday + Duration::days(offset))
            .filter(|day| self.weekdays.contains(&day.weekday()))
            .flat_map(|day| daily_slots(day, self.open, self.close, self.interval_minutes, &self.template))
            .collect();
        Ok(slots)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Interval must be between 1 and 1440 minutes")]
    InvalidInterval,

    #[error("End time {close} must be after start time {open}")]
    EndBeforeStart { open: WallTime, close: WallTime },

    #[error("Pick at least one weekday")]
    NoWeekdays,
}
