pub mod availability;
pub mod clock;
pub mod finalizer;
pub mod hold;
pub mod selection;
pub mod store;

#[cfg(test)]
mod test_support;

pub use availability::{week_start, Availability, AvailabilityReader, DateRange};
pub use clock::{Clock, ManualClock, SystemClock};
pub use finalizer::{validate_contact, BookingFinalizer};
pub use hold::{Countdown, HoldManager, HoldState, DEFAULT_COUNTDOWN_INTERVAL};
pub use selection::{ReserveRequest, Selection};
pub use store::{candidate_slots, hold_end, Candidate, ReservationStore, SlotAdminStore};

/// Failure taxonomy of the reservation protocol.
///
/// Caller errors (`InvalidSelection`, `MissingContactInfo`, `NoActiveHold`)
/// are always raised before any store call is made.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BookingError {
    #[error("Invalid selection: {0}")]
    InvalidSelection(String),
    #[error("No capacity left for the selected time")]
    SlotUnavailable,
    #[error("The selected time is no longer available")]
    SlotNoLongerAvailable,
    #[error("Hold expired, please select the time again")]
    HoldExpired,
    #[error("Hold has already been redeemed")]
    HoldAlreadyRedeemed,
    #[error("Missing contact info: {0}")]
    MissingContactInfo(String),
    #[error("No active hold, please hold a time first")]
    NoActiveHold,
    #[error("A confirmation for this hold is already in progress")]
    RedemptionInFlight,
    #[error("Superseded by a newer selection")]
    Superseded,
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Service temporarily unavailable: {0}")]
    TransientFailure(String),
}

impl BookingError {
    /// The user must go back to slot selection instead of retrying.
    pub fn requires_reselection(&self) -> bool {
        matches!(
            self,
            BookingError::HoldExpired
                | BookingError::SlotNoLongerAvailable
                | BookingError::SlotUnavailable
        )
    }

    /// A manual retry of the same operation is safe.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BookingError::TransientFailure(_))
    }

    pub fn transient(err: impl std::fmt::Display) -> Self {
        BookingError::TransientFailure(err.to_string())
    }

    /// Stable machine-readable code for clients.
    pub fn code(&self) -> &'static str {
        match self {
            BookingError::InvalidSelection(_) => "INVALID_SELECTION",
            BookingError::SlotUnavailable => "SLOT_UNAVAILABLE",
            BookingError::SlotNoLongerAvailable => "SLOT_NO_LONGER_AVAILABLE",
            BookingError::HoldExpired => "HOLD_EXPIRED",
            BookingError::HoldAlreadyRedeemed => "HOLD_ALREADY_REDEEMED",
            BookingError::MissingContactInfo(_) => "MISSING_CONTACT_INFO",
            BookingError::NoActiveHold => "NO_ACTIVE_HOLD",
            BookingError::RedemptionInFlight => "REDEMPTION_IN_FLIGHT",
            BookingError::Superseded => "SUPERSEDED",
            BookingError::NotFound(_) => "NOT_FOUND",
            BookingError::TransientFailure(_) => "TRANSIENT_FAILURE",
        }
    }
}

pub type CoreResult<T> = Result<T, BookingError>;
