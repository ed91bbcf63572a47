//! In-crate fake store with scripted responses and call counters.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use salon_shared::{Booking, Customer, Hold, ServiceInfo, Slot, StylistChoice, StylistInfo};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::availability::DateRange;
use crate::clock::{Clock, ManualClock};
use crate::selection::ReserveRequest;
use crate::store::ReservationStore;
use crate::{BookingError, CoreResult};

pub fn slot_at(date: &str, start: &str, stylist: Option<&str>, remaining: u32) -> Slot {
    let start_time: salon_shared::WallTime = start.parse().unwrap();
    Slot {
        id: Uuid::new_v4(),
        date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
        start_time,
        end_time: start_time.add_minutes(30),
        stylist_id: stylist.map(str::to_string),
        service_id: "cut".into(),
        capacity: remaining.max(1),
        remaining,
        is_open: true,
    }
}

pub struct ScriptedStore {
    pub clock: Arc<ManualClock>,
    slots: Mutex<Vec<Slot>>,
    gates: Mutex<HashMap<String, oneshot::Receiver<()>>>,
    reserve_error: Mutex<Option<BookingError>>,
    redeem_results: Mutex<VecDeque<CoreResult<Uuid>>>,
    pub reserve_calls: AtomicUsize,
    pub redeem_calls: AtomicUsize,
    pub release_calls: AtomicUsize,
}

impl Default for ScriptedStore {
    fn default() -> Self {
        Self::with_clock(Arc::new(ManualClock::default()))
    }
}

impl ScriptedStore {
    pub fn with_clock(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            slots: Mutex::new(Vec::new()),
            gates: Mutex::new(HashMap::new()),
            reserve_error: Mutex::new(None),
            redeem_results: Mutex::new(VecDeque::new()),
            reserve_calls: AtomicUsize::new(0),
            redeem_calls: AtomicUsize::new(0),
            release_calls: AtomicUsize::new(0),
        }
    }

    pub fn put_slots(&self, slots: Vec<Slot>) {
        self.slots.lock().unwrap().extend(slots);
    }

    /// Makes the next reserve for `start` wait until the returned sender fires.
    pub fn gate_reserve(&self, start: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().unwrap().insert(start.to_string(), rx);
        tx
    }

    pub fn fail_reserve_with(&self, err: BookingError) {
        *self.reserve_error.lock().unwrap() = Some(err);
    }

    pub fn push_redeem_result(&self, result: CoreResult<Uuid>) {
        self.redeem_results.lock().unwrap().push_back(result);
    }

    pub fn reserves(&self) -> usize {
        self.reserve_calls.load(Ordering::SeqCst)
    }

    pub fn redeems(&self) -> usize {
        self.redeem_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReservationStore for ScriptedStore {
    async fn reserve(&self, request: &ReserveRequest) -> CoreResult<Hold> {
        self.reserve_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gates.lock().unwrap().remove(&request.start.to_string());
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        if let Some(err) = self.reserve_error.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(Hold {
            hold_id: Uuid::new_v4(),
            slot_id: Uuid::new_v4(),
            service_id: request.service_id.clone(),
            stylist_id: request.stylist.specific().unwrap_or("alex").to_string(),
            date: request.date,
            start: request.start,
            end: request.start.add_minutes(30),
            expires_at: self.clock.now() + Duration::minutes(5),
        })
    }

    async fn release(&self, _hold_id: Uuid) -> CoreResult<()> {
        self.release_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn redeem(&self, _hold_id: Uuid, _customer: &Customer) -> CoreResult<Uuid> {
        self.redeem_calls.fetch_add(1, Ordering::SeqCst);
        self.redeem_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Uuid::new_v4()))
    }

    async fn read_slots(&self, range: &DateRange, _stylist: &StylistChoice) -> CoreResult<Vec<Slot>> {
        Ok(self
            .slots
            .lock()
            .unwrap()
            .iter()
            .filter(|s| range.contains(s.date))
            .cloned()
            .collect())
    }

    async fn read_slot(&self, slot_id: Uuid) -> CoreResult<Option<Slot>> {
        Ok(self.slots.lock().unwrap().iter().find(|s| s.id == slot_id).cloned())
    }

    async fn read_service(&self, _service_id: &str) -> CoreResult<Option<ServiceInfo>> {
        Ok(None)
    }

    async fn read_stylist(&self, _stylist_id: &str) -> CoreResult<Option<StylistInfo>> {
        Ok(None)
    }

    async fn read_booking(&self, _booking_id: Uuid) -> CoreResult<Option<Booking>> {
        Ok(None)
    }
}
