use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::{Duration, NaiveDate};
use jsonwebtoken::{encode, EncodingKey, Header};
use salon_api::middleware::AdminClaims;
use salon_api::{app, AppState, AuthConfig};
use salon_core::{
    BookingError, CoreResult, DateRange, ManualClock, ReservationStore, ReserveRequest, SlotAdminStore,
};
use salon_shared::{Booking, Customer, Hold, ServiceInfo, Slot, StylistChoice, StylistInfo};
use salon_store::app_config::AvailabilityRules;
use salon_store::{seed_reference_data, MemoryStore};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

const SECRET: &str = "test-secret";

struct TestApp {
    router: Router,
    clock: Arc<ManualClock>,
    store: Arc<MemoryStore>,
}

async fn setup() -> TestApp {
    let clock = Arc::new(ManualClock::new(
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap().and_hms_opt(8, 0, 0).unwrap().and_utc(),
    ));
    let store = Arc::new(MemoryStore::new(clock.clone(), Duration::minutes(5)));
    seed_reference_data(store.as_ref()).await.unwrap();

    let state = AppState::new(
        store.clone(),
        clock.clone(),
        AvailabilityRules::default(),
        AuthConfig { secret: SECRET.to_string() },
    );
    TestApp { router: app(state), clock, store }
}

fn slot(date: &str, start: &str, capacity: u32) -> Slot {
    let start_time: salon_shared::WallTime = start.parse().unwrap();
    Slot {
        id: Uuid::new_v4(),
        date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
        start_time,
        end_time: start_time.add_minutes(30),
        stylist_id: Some("priya".into()),
        service_id: "cut-style".into(),
        capacity,
        remaining: capacity,
        is_open: true,
    }
}

fn token(role: &str) -> String {
    let claims = AdminClaims {
        sub: "owner@salon.test".into(),
        role: role.into(),
        exp: (chrono::Utc::now() + Duration::hours(1)).timestamp() as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

async fn call(router: &Router, method: &str, uri: &str, body: Option<Value>, bearer: Option<&str>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(t) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", t));
    }
    let request = match body {
        Some(b) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, value)
}

fn hold_body(start: &str) -> Value {
    json!({ "service_id": "cut-style", "stylist_id": "any", "date": "2025-06-02", "start": start })
}

#[tokio::test]
async fn test_health() {
    let t = setup().await;
    let (status, body) = call(&t.router, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_hold_and_confirm_flow() {
    let t = setup().await;
    let s = slot("2025-06-02", "10:00", 1);
    t.store.create_slots(vec![s.clone()]).await.unwrap();

    let (status, hold) = call(&t.router, "POST", "/v1/holds", Some(hold_body("10:00")), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(hold["stylist_id"], "priya");
    assert_eq!(hold["expires_in_seconds"], 300);

    let (status, err) = call(&t.router, "POST", "/v1/holds", Some(hold_body("10:00")), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(err["code"], "SLOT_UNAVAILABLE");

    let confirm = json!({ "hold_id": hold["hold_id"], "name": "Jane Doe", "email": "jane@example.com" });
    let (status, booked) = call(&t.router, "POST", "/v1/bookings", Some(confirm.clone()), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(booked["booking"]["customer"]["service_name"], "Cut & Style");

    let uri = format!("/v1/bookings/{}", booked["booking_id"].as_str().unwrap());
    let (status, booking) = call(&t.router, "GET", &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(booking["start_time"], "10:00");

    let (status, err) = call(&t.router, "POST", "/v1/bookings", Some(confirm), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(err["code"], "HOLD_ALREADY_REDEEMED");
}

#[tokio::test]
async fn test_expired_hold_is_gone() {
    let t = setup().await;
    t.store.create_slots(vec![slot("2025-06-02", "10:00", 1)]).await.unwrap();

    let (_, hold) = call(&t.router, "POST", "/v1/holds", Some(hold_body("10:00")), None).await;
    t.clock.advance(Duration::minutes(6));

    let confirm = json!({ "hold_id": hold["hold_id"], "name": "Jane Doe", "email": "jane@example.com" });
    let (status, err) = call(&t.router, "POST", "/v1/bookings", Some(confirm), None).await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(err["code"], "HOLD_EXPIRED");
}

#[tokio::test]
async fn test_bad_input_is_rejected_before_store() {
    let t = setup().await;
    t.store.create_slots(vec![slot("2025-06-02", "10:00", 1)]).await.unwrap();

    let (status, err) = call(&t.router, "POST", "/v1/holds", Some(json!({ "date": "2025-06-02" })), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["code"], "INVALID_SELECTION");

    let (_, hold) = call(&t.router, "POST", "/v1/holds", Some(hold_body("10:00")), None).await;
    let confirm = json!({ "hold_id": hold["hold_id"], "name": "Jane", "email": "not-an-email" });
    let (status, err) = call(&t.router, "POST", "/v1/bookings", Some(confirm), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["code"], "MISSING_CONTACT_INFO");
    assert_eq!(t.store.active_holds().await, 1);
}

#[tokio::test]
async fn test_release_returns_capacity() {
    let t = setup().await;
    let s = slot("2025-06-02", "10:00", 1);
    t.store.create_slots(vec![s.clone()]).await.unwrap();

    let (_, hold) = call(&t.router, "POST", "/v1/holds", Some(hold_body("10:00")), None).await;
    let uri = format!("/v1/holds/{}", hold["hold_id"].as_str().unwrap());
    let (status, _) = call(&t.router, "DELETE", &uri, None, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = call(&t.router, "DELETE", &uri, None, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = call(&t.router, "POST", "/v1/holds", Some(hold_body("10:00")), None).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_hold_by_slot_link() {
    let t = setup().await;
    let s = slot("2025-06-02", "10:00", 1);
    t.store.create_slots(vec![s.clone()]).await.unwrap();

    let (status, hold) = call(&t.router, "POST", "/v1/holds", Some(json!({ "slot_ref": s.id.to_string() })), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(hold["slot_id"], s.id.to_string());

    let missing = json!({ "slot_ref": Uuid::new_v4().to_string() });
    let (status, err) = call(&t.router, "POST", "/v1/holds", Some(missing), None).await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(err["code"], "SLOT_NO_LONGER_AVAILABLE");
}

#[tokio::test]
async fn test_availability_and_next_week() {
    let t = setup().await;
    t.store
        .create_slots(vec![slot("2025-06-18", "14:00", 2), slot("2025-06-18", "09:30", 1)])
        .await
        .unwrap();

    let (status, week) = call(&t.router, "GET", "/v1/availability?from=2025-06-02", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(week["days"].as_object().unwrap().len(), 7);
    assert!(week["days"]["2025-06-02"].as_array().unwrap().is_empty());

    let (status, next) = call(&t.router, "GET", "/v1/availability/next?from=2025-06-02", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let day = next["days"]["2025-06-18"].as_array().unwrap();
    assert_eq!(day[0]["start_time"], "09:30");
    assert_eq!(day[1]["start_time"], "14:00");

    let (status, err) = call(&t.router, "GET", "/v1/availability?from=2025-06-02&to=2025-12-31", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["code"], "INVALID_SELECTION");
}

#[tokio::test]
async fn test_reference_lookups() {
    let t = setup().await;
    let (status, service) = call(&t.router, "GET", "/v1/services/color-style", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(service["duration_minutes"], 60);

    let (status, _) = call(&t.router, "GET", "/v1/stylists/nobody", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_requires_admin_role() {
    let t = setup().await;
    let plan = json!({
        "week_of": "2025-06-04",
        "open": "09:00",
        "close": "11:00",
        "interval_minutes": 30,
        "weekdays": ["Mon", "Tue"],
        "service_id": "cut-style",
        "stylist_id": "alex",
        "capacity": 1
    });

    let (status, _) = call(&t.router, "POST", "/v1/admin/slots/generate", Some(plan.clone()), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let customer = token("CUSTOMER");
    let (status, _) = call(&t.router, "POST", "/v1/admin/slots/generate", Some(plan.clone()), Some(&customer)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = token("ADMIN");
    let (status, body) = call(&t.router, "POST", "/v1/admin/slots/generate", Some(plan), Some(&admin)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["created"], 8);
}

#[tokio::test]
async fn test_admin_slot_edits() {
    let t = setup().await;
    let admin = token("ADMIN");
    let new_slot = json!({
        "date": "2025-06-02",
        "start_time": "10:00",
        "end_time": "10:30",
        "service_id": "cut-style",
        "capacity": 2
    });
    let (status, created) = call(&t.router, "POST", "/v1/admin/slots", Some(new_slot), Some(&admin)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["remaining"], 2);
    let base = format!("/v1/admin/slots/{}", created["id"].as_str().unwrap());

    let (_, edited) = call(&t.router, "PUT", &format!("{}/capacity", base), Some(json!({ "capacity": 1 })), Some(&admin)).await;
    assert_eq!((edited["capacity"].as_u64(), edited["remaining"].as_u64()), (Some(1), Some(1)));

    let (_, edited) = call(&t.router, "POST", &format!("{}/adjust", base), Some(json!({ "delta": -3 })), Some(&admin)).await;
    assert_eq!(edited["remaining"], 0);

    let (_, edited) = call(&t.router, "PUT", &format!("{}/open", base), Some(json!({ "is_open": false })), Some(&admin)).await;
    assert_eq!(edited["is_open"], false);

    let (status, _) = call(&t.router, "DELETE", &base, None, Some(&admin)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, err) = call(&t.router, "DELETE", &base, None, Some(&admin)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(err["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_admin_upserts_reference_data() {
    let t = setup().await;
    let admin = token("ADMIN");
    let (status, _) = call(
        &t.router,
        "PUT",
        "/v1/admin/stylists/mia",
        Some(json!({ "name": "Mia Chen" })),
        Some(&admin),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, stylist) = call(&t.router, "GET", "/v1/stylists/mia", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stylist["active"], true);
}

/// Memory store whose booking reads time out.
struct FlakyReads(Arc<MemoryStore>);

#[async_trait]
impl ReservationStore for FlakyReads {
    async fn reserve(&self, request: &ReserveRequest) -> CoreResult<Hold> {
        self.0.reserve(request).await
    }
    async fn release(&self, hold_id: Uuid) -> CoreResult<()> {
        self.0.release(hold_id).await
    }
    async fn redeem(&self, hold_id: Uuid, customer: &Customer) -> CoreResult<Uuid> {
        self.0.redeem(hold_id, customer).await
    }
    async fn read_slots(&self, range: &DateRange, stylist: &StylistChoice) -> CoreResult<Vec<Slot>> {
        self.0.read_slots(range, stylist).await
    }
    async fn read_slot(&self, slot_id: Uuid) -> CoreResult<Option<Slot>> {
        self.0.read_slot(slot_id).await
    }
    async fn read_service(&self, service_id: &str) -> CoreResult<Option<ServiceInfo>> {
        self.0.read_service(service_id).await
    }
    async fn read_stylist(&self, stylist_id: &str) -> CoreResult<Option<StylistInfo>> {
        self.0.read_stylist(stylist_id).await
    }
    async fn read_booking(&self, _booking_id: Uuid) -> CoreResult<Option<Booking>> {
        Err(BookingError::transient("read timeout"))
    }
}

#[async_trait]
impl SlotAdminStore for FlakyReads {
    async fn create_slots(&self, slots: Vec<Slot>) -> CoreResult<Vec<Slot>> {
        self.0.create_slots(slots).await
    }
    async fn set_capacity(&self, slot_id: Uuid, capacity: u32) -> CoreResult<Slot> {
        self.0.set_capacity(slot_id, capacity).await
    }
    async fn adjust_remaining(&self, slot_id: Uuid, delta: i64) -> CoreResult<Slot> {
        self.0.adjust_remaining(slot_id, delta).await
    }
    async fn set_open(&self, slot_id: Uuid, is_open: bool) -> CoreResult<Slot> {
        self.0.set_open(slot_id, is_open).await
    }
    async fn delete_slot(&self, slot_id: Uuid) -> CoreResult<()> {
        self.0.delete_slot(slot_id).await
    }
    async fn upsert_service(&self, service: ServiceInfo) -> CoreResult<()> {
        self.0.upsert_service(service).await
    }
    async fn upsert_stylist(&self, stylist: StylistInfo) -> CoreResult<()> {
        self.0.upsert_stylist(stylist).await
    }
}

#[tokio::test]
async fn test_committed_booking_survives_failed_read_back() {
    let t = setup().await;
    t.store.create_slots(vec![slot("2025-06-02", "10:00", 1)]).await.unwrap();
    let flaky = Arc::new(FlakyReads(t.store.clone()));
    let router = app(AppState::new(
        flaky,
        t.clock.clone(),
        AvailabilityRules::default(),
        AuthConfig { secret: SECRET.to_string() },
    ));

    let (_, hold) = call(&router, "POST", "/v1/holds", Some(hold_body("10:00")), None).await;
    let confirm = json!({ "hold_id": hold["hold_id"], "name": "Jane Doe", "email": "jane@example.com" });
    let (status, booked) = call(&router, "POST", "/v1/bookings", Some(confirm), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(booked["booking"].is_null());

    let booking_id: Uuid = booked["booking_id"].as_str().unwrap().parse().unwrap();
    let booking = t.store.read_booking(booking_id).await.unwrap().unwrap();
    assert_eq!(booking.hold_id.to_string(), hold["hold_id"].as_str().unwrap());
}
