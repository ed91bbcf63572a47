use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use salon_catalog::SlotInventory;
use salon_core::availability::DateRange;
use salon_core::store::{candidate_slots, hold_end};
use salon_core::{BookingError, Clock, CoreResult, ReservationStore, ReserveRequest, SlotAdminStore};
use salon_shared::{Booking, Customer, Hold, ServiceInfo, Slot, StylistChoice, StylistInfo};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Finished hold records are kept this long after expiry so that repeated
/// redemption attempts still get a precise answer.
const FINISHED_HOLD_RETENTION_HOURS: i64 = 24;

#[derive(Debug, Clone, PartialEq, Eq)]
enum HoldStatus {
    Active,
    Redeemed(Uuid),
    Released,
    Lapsed,
}

#[derive(Debug, Clone)]
struct HoldRecord {
    hold: Hold,
    status: HoldStatus,
}

#[derive(Default)]
struct Tables {
    slots: HashMap<Uuid, Slot>,
    holds: HashMap<Uuid, HoldRecord>,
    bookings: HashMap<Uuid, Booking>,
    services: HashMap<String, ServiceInfo>,
    stylists: BTreeMap<String, StylistInfo>,
}

impl Tables {
    /// Returns capacity of overdue active holds to their slots.
    fn lapse_expired(&mut self, now: DateTime<Utc>) -> usize {
        let mut lapsed = 0;
        for record in self.holds.values_mut() {
            if record.status == HoldStatus::Active && record.hold.is_expired_at(now) {
                record.status = HoldStatus::Lapsed;
                if let Some(slot) = self.slots.get_mut(&record.hold.slot_id) {
                    slot.restore();
                }
                debug!("Hold {} lapsed", record.hold.hold_id);
                lapsed += 1;
            }
        }
        lapsed
    }

    fn purge_finished(&mut self, now: DateTime<Utc>) {
        let horizon = now - Duration::hours(FINISHED_HOLD_RETENTION_HOURS);
        self.holds
            .retain(|_, r| r.status == HoldStatus::Active || r.hold.expires_at > horizon);
    }

    fn slot_mut(&mut self, slot_id: Uuid) -> CoreResult<&mut Slot> {
        self.slots
            .get_mut(&slot_id)
            .ok_or_else(|| BookingError::NotFound(format!("slot {}", slot_id)))
    }
}

/// Authoritative store held in process memory.
///
/// All capacity mutations happen under one write lock, which is the
/// critical section guaranteeing at most one decrement per hold.
pub struct MemoryStore {
    tables: RwLock<Tables>,
    clock: Arc<dyn Clock>,
    hold_ttl: Duration,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>, hold_ttl: Duration) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            clock,
            hold_ttl,
        }
    }

    pub fn hold_ttl(&self) -> Duration {
        self.hold_ttl
    }

    /// Lapses overdue holds and forgets long-finished ones.
    pub async fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut tables = self.tables.write().await;
        let lapsed = tables.lapse_expired(now);
        tables.purge_finished(now);
        lapsed
    }

    pub async fn active_holds(&self) -> usize {
        self.tables
            .read()
            .await
            .holds
            .values()
            .filter(|r| r.status == HoldStatus::Active)
            .count()
    }
}

#[async_trait]
impl ReservationStore for MemoryStore {
    async fn reserve(&self, request: &ReserveRequest) -> CoreResult<Hold> {
        let now = self.clock.now();
        let mut tables = self.tables.write().await;
        tables.lapse_expired(now);

        let same_day: Vec<Slot> = tables
            .slots
            .values()
            .filter(|s| s.date == request.date)
            .cloned()
            .collect();
        let roster: Vec<StylistInfo> = tables.stylists.values().cloned().collect();
        let candidate = candidate_slots(&same_day, request, &roster)
            .into_iter()
            .next()
            .ok_or(BookingError::SlotUnavailable)?;

        let end = hold_end(&candidate.slot, tables.services.get(&request.service_id));
        let slot = tables.slot_mut(candidate.slot.id)?;
        slot.earmark().map_err(|_| BookingError::SlotUnavailable)?;
        let remaining = slot.remaining;

        let hold = Hold {
            hold_id: Uuid::new_v4(),
            slot_id: candidate.slot.id,
            service_id: request.service_id.clone(),
            stylist_id: candidate.stylist_id,
            date: request.date,
            start: request.start,
            end,
            expires_at: now + self.hold_ttl,
        };
        tables.holds.insert(
            hold.hold_id,
            HoldRecord { hold: hold.clone(), status: HoldStatus::Active },
        );

        info!(
            "Hold {} placed on slot {} ({} left), expires {}",
            hold.hold_id, hold.slot_id, remaining, hold.expires_at
        );
        Ok(hold)
    }

    async fn release(&self, hold_id: Uuid) -> CoreResult<()> {
        let now = self.clock.now();
        let mut tables = self.tables.write().await;
        tables.lapse_expired(now);

        let slot_id = match tables.holds.get_mut(&hold_id) {
            Some(record) if record.status == HoldStatus::Active => {
                record.status = HoldStatus::Released;
                record.hold.slot_id
            }
            _ => {
                debug!("Release of hold {} ignored, not active", hold_id);
                return Ok(());
            }
        };
        if let Some(slot) = tables.slots.get_mut(&slot_id) {
            slot.restore();
        }
        info!("Hold {} released", hold_id);
        Ok(())
    }

    async fn redeem(&self, hold_id: Uuid, customer: &Customer) -> CoreResult<Uuid> {
        let now = self.clock.now();
        let mut tables = self.tables.write().await;
        tables.lapse_expired(now);

        // unknown ids are treated like holds the TTL already removed
        let record = tables.holds.get(&hold_id).cloned().ok_or(BookingError::HoldExpired)?;
        match record.status {
            HoldStatus::Active => {}
            HoldStatus::Redeemed(_) => return Err(BookingError::HoldAlreadyRedeemed),
            HoldStatus::Released | HoldStatus::Lapsed => return Err(BookingError::HoldExpired),
        }
        let hold = record.hold;

        if !tables.slots.contains_key(&hold.slot_id) {
            warn!("Slot {} vanished under hold {}", hold.slot_id, hold_id);
            if let Some(r) = tables.holds.get_mut(&hold_id) {
                r.status = HoldStatus::Lapsed;
            }
            return Err(BookingError::SlotNoLongerAvailable);
        }

        let mut customer = customer.clone();
        if customer.service_name.is_none() {
            customer.service_name = tables.services.get(&hold.service_id).map(|s| s.name.clone());
        }
        if customer.stylist_name.is_none() {
            customer.stylist_name = tables.stylists.get(&hold.stylist_id).map(|s| s.name.clone());
        }

        let booking = Booking::from_hold(&hold, customer, now);
        let booking_id = booking.id;
        tables.bookings.insert(booking_id, booking);
        if let Some(r) = tables.holds.get_mut(&hold_id) {
            r.status = HoldStatus::Redeemed(booking_id);
        }

        info!("Hold {} redeemed into booking {}", hold_id, booking_id);
        Ok(booking_id)
    }

    async fn read_slots(&self, range: &DateRange, stylist: &StylistChoice) -> CoreResult<Vec<Slot>> {
        let now = self.clock.now();
        let mut tables = self.tables.write().await;
        tables.lapse_expired(now);

        let mut slots: Vec<Slot> = tables
            .slots
            .values()
            .filter(|s| range.contains(s.date) && stylist.matches(s.stylist_id.as_deref()))
            .cloned()
            .collect();
        slots.sort_by(|a, b| {
            (a.date, a.start_time, &a.stylist_id, a.id).cmp(&(b.date, b.start_time, &b.stylist_id, b.id))
        });
        Ok(slots)
    }

    async fn read_slot(&self, slot_id: Uuid) -> CoreResult<Option<Slot>> {
        let now = self.clock.now();
        let mut tables = self.tables.write().await;
        tables.lapse_expired(now);
        Ok(tables.slots.get(&slot_id).cloned())
    }

    async fn read_service(&self, service_id: &str) -> CoreResult<Option<ServiceInfo>> {
        Ok(self.tables.read().await.services.get(service_id).cloned())
    }

    async fn read_stylist(&self, stylist_id: &str) -> CoreResult<Option<StylistInfo>> {
        Ok(self.tables.read().await.stylists.get(stylist_id).cloned())
    }

    async fn read_booking(&self, booking_id: Uuid) -> CoreResult<Option<Booking>> {
        Ok(self.tables.read().await.bookings.get(&booking_id).cloned())
    }
}

#[async_trait]
impl SlotAdminStore for MemoryStore {
    async fn create_slots(&self, slots: Vec<Slot>) -> CoreResult<Vec<Slot>> {
        let mut tables = self.tables.write().await;
        let created: Vec<Slot> = slots
            .into_iter()
            .map(|mut s| {
                s.remaining = s.remaining.min(s.capacity);
                s
            })
            .collect();
        for slot in &created {
            tables.slots.insert(slot.id, slot.clone());
        }
        info!("Created {} slots", created.len());
        Ok(created)
    }

    async fn set_capacity(&self, slot_id: Uuid, capacity: u32) -> CoreResult<Slot> {
        let mut tables = self.tables.write().await;
        let slot = tables.slot_mut(slot_id)?;
        slot.set_capacity(capacity);
        info!("Slot {} capacity set to {} ({} left)", slot_id, slot.capacity, slot.remaining);
        Ok(slot.clone())
    }

    async fn adjust_remaining(&self, slot_id: Uuid, delta: i64) -> CoreResult<Slot> {
        let mut tables = self.tables.write().await;
        let slot = tables.slot_mut(slot_id)?;
        slot.adjust_remaining(delta);
        info!("Slot {} remaining adjusted by {} to {}", slot_id, delta, slot.remaining);
        Ok(slot.clone())
    }

    async fn set_open(&self, slot_id: Uuid, is_open: bool) -> CoreResult<Slot> {
        let mut tables = self.tables.write().await;
        let slot = tables.slot_mut(slot_id)?;
        slot.is_open = is_open;
        info!("Slot {} is now {}", slot_id, if is_open { "open" } else { "closed" });
        Ok(slot.clone())
    }

    async fn delete_slot(&self, slot_id: Uuid) -> CoreResult<()> {
        let mut tables = self.tables.write().await;
        tables
            .slots
            .remove(&slot_id)
            .ok_or_else(|| BookingError::NotFound(format!("slot {}", slot_id)))?;
        info!("Slot {} deleted", slot_id);
        Ok(())
    }

    async fn upsert_service(&self, service: ServiceInfo) -> CoreResult<()> {
        self.tables.write().await.services.insert(service.id.clone(), service);
        Ok(())
    }

    async fn upsert_stylist(&self, stylist: StylistInfo) -> CoreResult<()> {
        self.tables.write().await.stylists.insert(stylist.id.clone(), stylist);
        Ok(())
    }
}
