use async_trait::async_trait;
use salon_shared::{
    Booking, Customer, Hold, ServiceInfo, Slot, StylistChoice, StylistInfo, WallTime,
};
use uuid::Uuid;

use crate::availability::DateRange;
use crate::selection::ReserveRequest;
use crate::CoreResult;

/// Capability contract of the slot store and its transactional functions.
///
/// `reserve` and `redeem` are not idempotent; callers must not retry them
/// blindly. `redeem` must never be retried automatically.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// Earmarks one unit of capacity and returns a hold with a concrete stylist.
    async fn reserve(&self, request: &ReserveRequest) -> CoreResult<Hold>;

    /// Best-effort early release; unknown or finished holds are a no-op.
    async fn release(&self, hold_id: Uuid) -> CoreResult<()>;

    /// Converts an active hold into a booking, at most once per hold.
    async fn redeem(&self, hold_id: Uuid, customer: &Customer) -> CoreResult<Uuid>;

    async fn read_slots(&self, range: &DateRange, stylist: &StylistChoice) -> CoreResult<Vec<Slot>>;

    async fn read_slot(&self, slot_id: Uuid) -> CoreResult<Option<Slot>>;

    async fn read_service(&self, service_id: &str) -> CoreResult<Option<ServiceInfo>>;

    async fn read_stylist(&self, stylist_id: &str) -> CoreResult<Option<StylistInfo>>;

    async fn read_booking(&self, booking_id: Uuid) -> CoreResult<Option<Booking>>;
}

/// Admin-side mutations of slot inventory and reference data.
#[async_trait]
pub trait SlotAdminStore: Send + Sync {
    async fn create_slots(&self, slots: Vec<Slot>) -> CoreResult<Vec<Slot>>;

    async fn set_capacity(&self, slot_id: Uuid, capacity: u32) -> CoreResult<Slot>;

    async fn adjust_remaining(&self, slot_id: Uuid, delta: i64) -> CoreResult<Slot>;

    async fn set_open(&self, slot_id: Uuid, is_open: bool) -> CoreResult<Slot>;

    async fn delete_slot(&self, slot_id: Uuid) -> CoreResult<()>;

    async fn upsert_service(&self, service: ServiceInfo) -> CoreResult<()>;

    async fn upsert_stylist(&self, stylist: StylistInfo) -> CoreResult<()>;
}

/// A slot that can satisfy a reserve request, with the stylist it resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub slot: Slot,
    pub stylist_id: String,
}

/// Filters and ranks the slots able to satisfy `request`.
///
/// Assigned slots come before unassigned ones, then more remaining capacity,
/// then stylist id and slot id. Unassigned slots resolve to the requested
/// stylist when that stylist is active in `roster`, or for "any" to the first
/// active stylist by id.
pub fn candidate_slots(slots: &[Slot], request: &ReserveRequest, roster: &[StylistInfo]) -> Vec<Candidate> {
    let fallback_stylist = roster
        .iter()
        .filter(|s| s.active)
        .map(|s| s.id.as_str())
        .min()
        .map(str::to_string);

    let mut candidates: Vec<Candidate> = slots
        .iter()
        .filter(|s| {
            s.is_bookable()
                && s.date == request.date
                && s.start_time == request.start
                && s.service_id == request.service_id
        })
        .filter_map(|s| {
            let stylist_id = match (&s.stylist_id, &request.stylist) {
                (Some(assigned), StylistChoice::Any) => assigned.clone(),
                (Some(assigned), StylistChoice::Specific(wanted)) if assigned == wanted => assigned.clone(),
                (Some(_), StylistChoice::Specific(_)) => return None,
                (None, StylistChoice::Specific(wanted)) => {
                    roster.iter().find(|st| st.active && &st.id == wanted)?.id.clone()
                }
                (None, StylistChoice::Any) => fallback_stylist.clone()?,
            };
            Some(Candidate { slot: s.clone(), stylist_id })
        })
        .collect();

    candidates.sort_by(|a, b| {
        a.slot
            .stylist_id
            .is_none()
            .cmp(&b.slot.stylist_id.is_none())
            .then(b.slot.remaining.cmp(&a.slot.remaining))
            .then(a.stylist_id.cmp(&b.stylist_id))
            .then(a.slot.id.cmp(&b.slot.id))
    });
    candidates
}

/// End of a held appointment: start plus the service duration when known,
/// otherwise the slot's own end time.
pub fn hold_end(slot: &Slot, service: Option<&ServiceInfo>) -> WallTime {
    match service {
        Some(svc) if svc.duration_minutes > 0 => slot.start_time.add_minutes(svc.duration_minutes),
        _ => slot.end_time,
    }
}
