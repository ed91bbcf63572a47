use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use salon_shared::{Hold, SlotRef};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::selection::Selection;
use crate::store::ReservationStore;
use crate::{BookingError, CoreResult};

pub const DEFAULT_COUNTDOWN_INTERVAL: Duration = Duration::from_millis(250);

/// Externally visible hold lifecycle: `NONE -> ACTIVE -> {EXPIRED, REDEEMED, RELEASED}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HoldState {
    None,
    Active,
    Expired,
    Redeemed,
    Released,
}

#[derive(Debug, Clone)]
enum Phase {
    None,
    Active(Hold),
    /// Still active from the user's point of view; a confirmation is in flight.
    Redeeming(Hold),
    Expired(Hold),
    Redeemed { hold: Hold, booking_id: Uuid },
    Released(Hold),
}

impl Phase {
    fn state(&self) -> HoldState {
        match self {
            Phase::None => HoldState::None,
            Phase::Active(_) | Phase::Redeeming(_) => HoldState::Active,
            Phase::Expired(_) => HoldState::Expired,
            Phase::Redeemed { .. } => HoldState::Redeemed,
            Phase::Released(_) => HoldState::Released,
        }
    }

    fn hold(&self) -> Option<&Hold> {
        match self {
            Phase::None => None,
            Phase::Active(h) | Phase::Redeeming(h) | Phase::Expired(h) | Phase::Released(h) => Some(h),
            Phase::Redeemed { hold, .. } => Some(hold),
        }
    }
}

struct Session {
    /// Bumped by every acquisition; responses tagged with an older value are stale.
    seq: u64,
    pending: Option<u64>,
    /// Acquisition that a release cut short; its hold goes straight back.
    cancelled: Option<u64>,
    phase: Phase,
}

/// Snapshot published by the countdown task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Countdown {
    pub state: HoldState,
    pub hold_id: Option<Uuid>,
    pub remaining_secs: Option<u64>,
}

impl Countdown {
    fn idle() -> Self {
        Self { state: HoldState::None, hold_id: None, remaining_secs: None }
    }

    /// `MM:SS` for an active or expired hold.
    pub fn label(&self) -> Option<String> {
        match self.state {
            HoldState::Active => self.remaining_secs.map(|secs| format!("{:02}:{:02}", secs / 60, secs % 60)),
            HoldState::Expired => Some("00:00".to_string()),
            _ => None,
        }
    }
}

/// Owns the single hold of one booking session.
pub struct HoldManager {
    store: Arc<dyn ReservationStore>,
    clock: Arc<dyn Clock>,
    session: Mutex<Session>,
}

impl HoldManager {
    pub fn new(store: Arc<dyn ReservationStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            session: Mutex::new(Session { seq: 0, pending: None, cancelled: None, phase: Phase::None }),
        }
    }

    /// Requests a hold for the current selection, superseding any previous one.
    ///
    /// The previous hold is abandoned, not released; the store's TTL reclaims it.
    /// If another acquisition starts while this one is in flight, this call
    /// returns [`BookingError::Superseded`] and its result is dropped.
    pub async fn acquire_hold(&self, selection: &Selection) -> CoreResult<Hold> {
        let request = selection.validate()?;

        let seq = {
            let mut session = self.session.lock().await;
            session.seq += 1;
            if let Phase::Active(old) | Phase::Redeeming(old) = &session.phase {
                debug!("Abandoning hold {} for a new selection", old.hold_id);
            }
            session.phase = Phase::None;
            session.pending = Some(session.seq);
            session.seq
        };

        let result = self.store.reserve(&request).await;

        let mut session = self.session.lock().await;
        if session.seq != seq {
            match &result {
                Ok(hold) if session.cancelled == Some(seq) => {
                    info!("Hold {} landed after release, giving it back", hold.hold_id);
                    if session.seq == seq + 1 {
                        session.phase = Phase::Released(hold.clone());
                    }
                    self.release_in_background(hold.hold_id);
                }
                Ok(hold) => debug!("Discarding stale hold {} (request #{} superseded)", hold.hold_id, seq),
                Err(e) => debug!("Discarding stale hold failure (request #{}): {}", seq, e),
            }
            return Err(BookingError::Superseded);
        }
        session.pending = None;

        match result {
            Ok(hold) => {
                info!(
                    "Hold {} active: {} {} with {} until {}",
                    hold.hold_id, hold.date, hold.start, hold.stylist_id, hold.expires_at
                );
                session.phase = Phase::Active(hold.clone());
                Ok(hold)
            }
            Err(e) => {
                warn!("Hold request #{} failed: {}", seq, e);
                session.phase = Phase::None;
                Err(e)
            }
        }
    }

    /// Holds the slot a link points at.
    pub async fn acquire_slot(&self, slot_ref: &SlotRef) -> CoreResult<Hold> {
        let selection = Selection::resolve(slot_ref, self.store.as_ref()).await?;
        self.acquire_hold(&selection).await
    }

    /// Gives the active hold back early and invalidates any acquisition still
    /// in flight. Idempotent; the store call runs in the background and its
    /// failure is only logged.
    pub async fn release(&self) {
        let released = {
            let mut session = self.session.lock().await;
            if let Some(in_flight) = session.pending.take() {
                debug!("Release cancels hold request #{}", in_flight);
                session.cancelled = Some(in_flight);
            }
            session.seq += 1;
            match session.phase.clone() {
                Phase::Active(hold) => {
                    session.phase = Phase::Released(hold.clone());
                    Some(hold)
                }
                _ => None,
            }
        };

        if let Some(hold) = released {
            info!("Hold {} released", hold.hold_id);
            self.release_in_background(hold.hold_id);
        }
    }

    fn release_in_background(&self, hold_id: Uuid) {
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            if let Err(e) = store.release(hold_id).await {
                warn!("Release of hold {} did not reach the store: {}", hold_id, e);
            }
        });
    }

    /// Applies time-based expiry and returns the resulting state.
    pub async fn tick(&self) -> HoldState {
        let now = self.clock.now();
        let mut session = self.session.lock().await;
        let lapsed = match &session.phase {
            Phase::Active(hold) if hold.is_expired_at(now) => Some(hold.clone()),
            _ => None,
        };
        if let Some(hold) = lapsed {
            info!("Hold {} expired at {}", hold.hold_id, hold.expires_at);
            session.phase = Phase::Expired(hold);
        }
        session.phase.state()
    }

    pub async fn state(&self) -> HoldState {
        self.tick().await
    }

    /// The hold that can currently be redeemed, if any.
    pub async fn current(&self) -> Option<Hold> {
        self.tick().await;
        match &self.session.lock().await.phase {
            Phase::Active(hold) => Some(hold.clone()),
            _ => None,
        }
    }

    pub async fn is_acquiring(&self) -> bool {
        self.session.lock().await.pending.is_some()
    }

    pub async fn countdown(&self) -> Countdown {
        let state = self.tick().await;
        let now = self.clock.now();
        let session = self.session.lock().await;
        let hold = session.phase.hold();
        Countdown {
            state,
            hold_id: hold.map(|h| h.hold_id),
            remaining_secs: match state {
                HoldState::Active => hold.map(|h| h.time_left(now).num_seconds().max(0) as u64),
                _ => None,
            },
        }
    }

    /// Polls expiry every `every` and publishes changes. The task ends once
    /// every receiver has been dropped.
    pub fn spawn_countdown(self: &Arc<Self>, every: Duration) -> (JoinHandle<()>, watch::Receiver<Countdown>) {
        let manager = Arc::clone(self);
        let (tx, rx) = watch::channel(Countdown::idle());
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if tx.is_closed() {
                    debug!("Countdown has no subscribers, stopping");
                    break;
                }
                let next = manager.countdown().await;
                tx.send_if_modified(|current| {
                    if *current != next {
                        *current = next;
                        true
                    } else {
                        false
                    }
                });
            }
        });
        (handle, rx)
    }

    /// Moves the named hold into redemption. Expired holds fail here without
    /// a store call.
    pub(crate) async fn begin_redemption(&self, hold_id: Uuid) -> CoreResult<Hold> {
        let now = self.clock.now();
        let mut session = self.session.lock().await;
        match session.phase.clone() {
            Phase::Active(hold) if hold.hold_id == hold_id => {
                if hold.is_expired_at(now) {
                    info!("Hold {} expired before confirmation", hold_id);
                    session.phase = Phase::Expired(hold);
                    return Err(BookingError::HoldExpired);
                }
                session.phase = Phase::Redeeming(hold.clone());
                Ok(hold)
            }
            Phase::Redeeming(hold) if hold.hold_id == hold_id => Err(BookingError::RedemptionInFlight),
            Phase::Expired(hold) if hold.hold_id == hold_id => Err(BookingError::HoldExpired),
            Phase::Redeemed { hold, .. } if hold.hold_id == hold_id => Err(BookingError::HoldAlreadyRedeemed),
            _ => Err(BookingError::NoActiveHold),
        }
    }

    /// Records the store's verdict, unless the session has moved on.
    pub(crate) async fn finish_redemption(&self, hold_id: Uuid, outcome: &CoreResult<Uuid>) {
        let mut session = self.session.lock().await;
        let hold = match &session.phase {
            Phase::Redeeming(hold) if hold.hold_id == hold_id => hold.clone(),
            _ => {
                debug!("Session moved on while hold {} was being redeemed", hold_id);
                return;
            }
        };

        session.phase = match outcome {
            Ok(booking_id) => Phase::Redeemed { hold, booking_id: *booking_id },
            Err(BookingError::HoldExpired) => Phase::Expired(hold),
            Err(BookingError::SlotNoLongerAvailable)
            | Err(BookingError::SlotUnavailable)
            | Err(BookingError::HoldAlreadyRedeemed) => Phase::None,
            Err(_) => Phase::Active(hold),
        };
    }

    /// Booking created from the current hold, if it was redeemed.
    pub async fn booking_id(&self) -> Option<Uuid> {
        match &self.session.lock().await.phase {
            Phase::Redeemed { booking_id, .. } => Some(*booking_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::test_support::ScriptedStore;
    use std::sync::atomic::Ordering;

    fn setup() -> (Arc<ScriptedStore>, Arc<ManualClock>, Arc<HoldManager>) {
        let clock = Arc::new(ManualClock::default());
        let store = Arc::new(ScriptedStore::with_clock(clock.clone()));
        let manager = Arc::new(HoldManager::new(store.clone(), clock.clone()));
        (store, clock, manager)
    }

    fn selection(start: &str) -> Selection {
        Selection::new("cut", "any", "2025-06-02", start)
    }

    #[tokio::test]
    async fn test_invalid_selection_makes_no_store_call() {
        let (store, _clock, manager) = setup();
        let err = manager
            .acquire_hold(&Selection::new("", "any", "2025-06-02", "10:00"))
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::InvalidSelection(_)));
        assert_eq!(store.reserves(), 0);
        assert_eq!(manager.state().await, HoldState::None);
    }

    #[tokio::test]
    async fn test_acquire_resolves_any_stylist() {
        let (_store, _clock, manager) = setup();
        let hold = manager.acquire_hold(&selection("10:00")).await.unwrap();
        assert_eq!(hold.stylist_id, "alex");
        assert_eq!(manager.state().await, HoldState::Active);
        assert_eq!(manager.current().await.unwrap().hold_id, hold.hold_id);
    }

    #[tokio::test]
    async fn test_failed_acquire_leaves_no_hold() {
        let (store, _clock, manager) = setup();
        manager.acquire_hold(&selection("10:00")).await.unwrap();

        store.fail_reserve_with(BookingError::SlotUnavailable);
        let err = manager.acquire_hold(&selection("11:00")).await.unwrap_err();
        assert_eq!(err, BookingError::SlotUnavailable);
        assert_eq!(manager.state().await, HoldState::None);
        assert!(manager.current().await.is_none());
    }

    #[tokio::test]
    async fn test_late_response_never_overwrites_newer_hold() {
        let (store, _clock, manager) = setup();
        let gate = store.gate_reserve("10:00");

        let slow = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.acquire_hold(&selection("10:00")).await })
        };
        while store.reserves() == 0 {
            tokio::task::yield_now().await;
        }

        let newer = manager.acquire_hold(&selection("11:00")).await.unwrap();
        gate.send(()).unwrap();

        let stale = slow.await.unwrap();
        assert_eq!(stale.unwrap_err(), BookingError::Superseded);

        let current = manager.current().await.unwrap();
        assert_eq!(current.hold_id, newer.hold_id);
        assert_eq!(current.start.to_string(), "11:00");
        assert!(!manager.is_acquiring().await);
    }

    #[tokio::test]
    async fn test_release_cancels_in_flight_acquisition() {
        let (store, _clock, manager) = setup();
        manager.acquire_hold(&selection("10:00")).await.unwrap();
        let gate = store.gate_reserve("11:00");

        let slow = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.acquire_hold(&selection("11:00")).await })
        };
        while store.reserves() < 2 {
            tokio::task::yield_now().await;
        }

        manager.release().await;
        assert!(!manager.is_acquiring().await);
        gate.send(()).unwrap();

        assert_eq!(slow.await.unwrap().unwrap_err(), BookingError::Superseded);
        assert_eq!(manager.state().await, HoldState::Released);
        assert!(manager.current().await.is_none());

        for _ in 0..50 {
            if store.release_calls.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(store.release_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expiry_on_tick() {
        let (_store, clock, manager) = setup();
        manager.acquire_hold(&selection("10:00")).await.unwrap();

        clock.advance(chrono::Duration::minutes(4));
        assert_eq!(manager.tick().await, HoldState::Active);

        clock.advance(chrono::Duration::minutes(1));
        assert_eq!(manager.tick().await, HoldState::Expired);
        assert!(manager.current().await.is_none());
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let (store, _clock, manager) = setup();
        manager.release().await;
        assert_eq!(manager.state().await, HoldState::None);

        manager.acquire_hold(&selection("10:00")).await.unwrap();
        manager.release().await;
        manager.release().await;
        assert_eq!(manager.state().await, HoldState::Released);

        for _ in 0..50 {
            if store.release_calls.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(store.release_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_countdown_reports_expiry() {
        let (_store, clock, manager) = setup();
        manager.acquire_hold(&selection("10:00")).await.unwrap();

        let (handle, mut rx) = manager.spawn_countdown(Duration::from_millis(10));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().state, HoldState::Active);
        assert_eq!(rx.borrow().label().as_deref(), Some("05:00"));

        clock.advance(chrono::Duration::minutes(6));
        let expired = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                rx.changed().await.unwrap();
                if rx.borrow().state == HoldState::Expired {
                    break rx.borrow().clone();
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(expired.label().as_deref(), Some("00:00"));

        drop(rx);
        tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
    }
}
