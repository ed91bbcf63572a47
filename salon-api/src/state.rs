use std::sync::Arc;
use salon_core::{Clock, ReservationStore, SlotAdminStore};
use salon_shared::{SlotEvent, SlotEventKind};
use salon_store::app_config::AvailabilityRules;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

const EVENT_BUFFER: usize = 256;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ReservationStore>,
    pub admin: Arc<dyn SlotAdminStore>,
    pub clock: Arc<dyn Clock>,
    pub sse_tx: broadcast::Sender<SlotEvent>,
    pub availability: AvailabilityRules,
    pub auth: AuthConfig,
}

impl AppState {
    pub fn new<S>(store: Arc<S>, clock: Arc<dyn Clock>, availability: AvailabilityRules, auth: AuthConfig) -> Self
    where
        S: ReservationStore + SlotAdminStore + 'static,
    {
        let (sse_tx, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            store: store.clone(),
            admin: store,
            clock,
            sse_tx,
            availability,
            auth,
        }
    }

    pub fn publish(&self, event: SlotEvent) {
        if self.sse_tx.send(event).is_err() {
            debug!("No availability subscribers for slot event");
        }
    }

    /// Publishes the slot's current capacity. Lookup failures are only logged.
    pub async fn publish_slot(&self, kind: SlotEventKind, slot_id: Uuid) {
        match self.store.read_slot(slot_id).await {
            Ok(Some(slot)) => self.publish(SlotEvent::for_slot(kind, &slot, self.clock.now())),
            Ok(None) => debug!("Slot {} vanished before its {} event", slot_id, kind.as_str()),
            Err(e) => warn!("Could not read slot {} for {} event: {}", slot_id, kind.as_str(), e),
        }
    }
}
