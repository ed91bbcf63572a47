use std::sync::Arc;
use salon_shared::Customer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::hold::HoldManager;
use crate::store::ReservationStore;
use crate::{BookingError, CoreResult};

/// Redeems the session's active hold into a booking.
pub struct BookingFinalizer {
    holds: Arc<HoldManager>,
    store: Arc<dyn ReservationStore>,
}

impl BookingFinalizer {
    pub fn new(holds: Arc<HoldManager>, store: Arc<dyn ReservationStore>) -> Self {
        Self { holds, store }
    }

    /// Confirms the hold `hold_id` for `customer` and returns the booking id.
    ///
    /// Calls the store's redemption exactly once and never retries it: a
    /// failure with unknown outcome could otherwise book twice.
    pub async fn confirm(&self, hold_id: Uuid, customer: &Customer) -> CoreResult<Uuid> {
        validate_contact(customer)?;

        let hold = self.holds.begin_redemption(hold_id).await?;
        let outcome = self.store.redeem(hold.hold_id, customer).await;
        self.holds.finish_redemption(hold.hold_id, &outcome).await;

        match &outcome {
            Ok(booking_id) => info!("Hold {} redeemed into booking {}", hold_id, booking_id),
            Err(e) => warn!("Redemption of hold {} failed: {}", hold_id, e),
        }
        outcome
    }
}

/// Non-empty name and a plausible e-mail address.
pub fn validate_contact(customer: &Customer) -> CoreResult<()> {
    if customer.name.trim().is_empty() {
        return Err(BookingError::MissingContactInfo("name is required".into()));
    }
    let email = customer.email.expose().trim();
    if email.is_empty() {
        return Err(BookingError::MissingContactInfo("email is required".into()));
    }
    if !is_plausible_email(email) {
        return Err(BookingError::MissingContactInfo("email address looks invalid".into()));
    }
    Ok(())
}

fn is_plausible_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}
