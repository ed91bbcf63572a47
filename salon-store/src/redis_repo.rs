use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use salon_core::availability::DateRange;
use salon_core::store::{candidate_slots, hold_end};
use salon_core::{BookingError, Clock, CoreResult, ReservationStore, ReserveRequest, SlotAdminStore};
use salon_shared::{Booking, Customer, Hold, ServiceInfo, Slot, StylistChoice, StylistInfo};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

const FINISHED_HOLD_RETENTION_MS: i64 = 24 * 60 * 60 * 1000;

// Every script first lapses holds whose score (expiry, epoch millis) is <= now
// and hands their units back to the slot.
const PRUNE_LUA: &str = r#"
local function prune(slot_key, holds_key, now)
    if redis.call('EXISTS', slot_key) == 0 then
        redis.call('DEL', holds_key)
        return 0
    end
    local lapsed = redis.call('ZRANGEBYSCORE', holds_key, '-inf', now)
    if #lapsed == 0 then
        return 0
    end
    redis.call('ZREMRANGEBYSCORE', holds_key, '-inf', now)
    local cap = tonumber(redis.call('HGET', slot_key, 'capacity') or '0')
    local rem = tonumber(redis.call('HGET', slot_key, 'remaining') or '0')
    redis.call('HSET', slot_key, 'remaining', math.min(cap, rem + #lapsed))
    for _, id in ipairs(lapsed) do
        if redis.call('HGET', 'hold:' .. id, 'status') == 'active' then
            redis.call('HSET', 'hold:' .. id, 'status', 'lapsed')
        end
    end
    return #lapsed
end
"#;

// KEYS: slot, slot holds, hold
// ARGV: now, expires_at, hold_id, payload, retention_ms, slot_id
const RESERVE_LUA: &str = r#"
local now = tonumber(ARGV[1])
if redis.call('EXISTS', KEYS[1]) == 0 then
    return -1
end
prune(KEYS[1], KEYS[2], now)
if redis.call('HGET', KEYS[1], 'is_open') ~= '1' then
    return -2
end
local rem = tonumber(redis.call('HGET', KEYS[1], 'remaining') or '0')
if rem <= 0 then
    return -3
end
redis.call('HSET', KEYS[1], 'remaining', rem - 1)
redis.call('ZADD', KEYS[2], ARGV[2], ARGV[3])
redis.call('HSET', KEYS[3], 'status', 'active', 'slot_id', ARGV[6], 'payload', ARGV[4])
redis.call('PEXPIREAT', KEYS[3], tonumber(ARGV[2]) + tonumber(ARGV[5]))
return rem - 1
"#;

// KEYS: hold, booking
// ARGV: now, hold_id, booking_id, booking_json
const REDEEM_LUA: &str = r#"
local now = tonumber(ARGV[1])
local status = redis.call('HGET', KEYS[1], 'status')
if not status then
    return 'expired'
end
if status == 'redeemed' then
    return 'already'
end
if status ~= 'active' then
    return 'expired'
end
local slot_key = 'slot:' .. redis.call('HGET', KEYS[1], 'slot_id')
local holds_key = slot_key .. ':holds'
if redis.call('EXISTS', slot_key) == 0 then
    redis.call('HSET', KEYS[1], 'status', 'lapsed')
    return 'gone'
end
prune(slot_key, holds_key, now)
if not redis.call('ZSCORE', holds_key, ARGV[2]) then
    return 'expired'
end
redis.call('ZREM', holds_key, ARGV[2])
redis.call('SET', KEYS[2], ARGV[4])
redis.call('HSET', KEYS[1], 'status', 'redeemed', 'booking_id', ARGV[3])
return 'ok'
"#;

// KEYS: hold
// ARGV: now, hold_id
const RELEASE_LUA: &str = r#"
local now = tonumber(ARGV[1])
if redis.call('HGET', KEYS[1], 'status') ~= 'active' then
    return 0
end
local slot_key = 'slot:' .. redis.call('HGET', KEYS[1], 'slot_id')
local holds_key = slot_key .. ':holds'
prune(slot_key, holds_key, now)
if redis.call('ZREM', holds_key, ARGV[2]) == 1 then
    local cap = tonumber(redis.call('HGET', slot_key, 'capacity') or '0')
    local rem = tonumber(redis.call('HGET', slot_key, 'remaining') or '0')
    redis.call('HSET', slot_key, 'remaining', math.min(cap, rem + 1))
end
if redis.call('HGET', KEYS[1], 'status') == 'active' then
    redis.call('HSET', KEYS[1], 'status', 'released')
end
return 1
"#;

// KEYS: slot, slot holds
// ARGV: now, op (capacity | adjust | open), value
const EDIT_SLOT_LUA: &str = r#"
local now = tonumber(ARGV[1])
if redis.call('EXISTS', KEYS[1]) == 0 then
    return -1
end
prune(KEYS[1], KEYS[2], now)
local cap = tonumber(redis.call('HGET', KEYS[1], 'capacity') or '0')
local rem = tonumber(redis.call('HGET', KEYS[1], 'remaining') or '0')
if ARGV[2] == 'capacity' then
    cap = tonumber(ARGV[3])
    rem = math.min(rem, cap)
elseif ARGV[2] == 'adjust' then
    rem = math.max(0, math.min(cap, rem + tonumber(ARGV[3])))
elseif ARGV[2] == 'open' then
    redis.call('HSET', KEYS[1], 'is_open', ARGV[3])
end
redis.call('HSET', KEYS[1], 'capacity', cap, 'remaining', rem)
return rem
"#;

// KEYS: slot, slot holds
// ARGV: slot_id
const DELETE_SLOT_LUA: &str = r#"
local date = redis.call('HGET', KEYS[1], 'date')
if not date then
    return 0
end
redis.call('DEL', KEYS[1], KEYS[2])
redis.call('SREM', 'slots:date:' .. date, ARGV[1])
return 1
"#;

fn with_prune(body: &str) -> redis::Script {
    redis::Script::new(&format!("{}\n{}", PRUNE_LUA, body))
}

struct Scripts {
    reserve: redis::Script,
    redeem: redis::Script,
    release: redis::Script,
    edit_slot: redis::Script,
    delete_slot: redis::Script,
}

impl Scripts {
    fn load() -> Self {
        Self {
            reserve: with_prune(RESERVE_LUA),
            redeem: with_prune(REDEEM_LUA),
            release: with_prune(RELEASE_LUA),
            edit_slot: with_prune(EDIT_SLOT_LUA),
            delete_slot: redis::Script::new(DELETE_SLOT_LUA),
        }
    }
}

pub fn slot_key(slot_id: Uuid) -> String {
    format!("slot:{}", slot_id)
}

pub fn slot_holds_key(slot_id: Uuid) -> String {
    format!("slot:{}:holds", slot_id)
}

pub fn date_index_key(date: NaiveDate) -> String {
    format!("slots:date:{}", date.format("%Y-%m-%d"))
}

pub fn hold_key(hold_id: Uuid) -> String {
    format!("hold:{}", hold_id)
}

pub fn booking_key(booking_id: Uuid) -> String {
    format!("booking:{}", booking_id)
}

fn service_key(service_id: &str) -> String {
    format!("service:{}", service_id)
}

fn stylist_key(stylist_id: &str) -> String {
    format!("stylist:{}", stylist_id)
}

const STYLIST_INDEX_KEY: &str = "stylists";

/// Hash fields persisted for a slot. An unassigned stylist is stored as "".
pub fn slot_fields(slot: &Slot) -> Vec<(&'static str, String)> {
    vec![
        ("id", slot.id.to_string()),
        ("date", slot.date.format("%Y-%m-%d").to_string()),
        ("start_time", slot.start_time.to_string()),
        ("end_time", slot.end_time.to_string()),
        ("stylist_id", slot.stylist_id.clone().unwrap_or_default()),
        ("service_id", slot.service_id.clone()),
        ("capacity", slot.capacity.to_string()),
        ("remaining", slot.remaining.min(slot.capacity).to_string()),
        ("is_open", if slot.is_open { "1" } else { "0" }.to_string()),
    ]
}

/// Rebuilds a slot from its hash, crediting holds that lapsed but were not
/// pruned yet. Returns `None` for a missing or malformed hash.
pub fn slot_from_hash(fields: &HashMap<String, String>, unpruned_lapsed: u32) -> Option<Slot> {
    let get = |name: &str| fields.get(name).map(String::as_str);
    let capacity: u32 = get("capacity")?.parse().ok()?;
    let remaining: u32 = get("remaining")?.parse().ok()?;
    Some(Slot {
        id: get("id")?.parse().ok()?,
        date: NaiveDate::parse_from_str(get("date")?, "%Y-%m-%d").ok()?,
        start_time: get("start_time")?.parse().ok()?,
        end_time: get("end_time")?.parse().ok()?,
        stylist_id: get("stylist_id").filter(|s| !s.is_empty()).map(str::to_string),
        service_id: get("service_id")?.to_string(),
        capacity,
        remaining: remaining.saturating_add(unpruned_lapsed).min(capacity),
        is_open: get("is_open") == Some("1"),
    })
}

fn store_error(err: redis::RedisError) -> BookingError {
    warn!("Redis call failed: {}", err);
    BookingError::transient(err)
}

fn codec_error(err: serde_json::Error) -> BookingError {
    BookingError::transient(format!("stored record is not valid JSON: {}", err))
}

/// Shared store on Redis. Capacity changes run as Lua scripts, so each one
/// is atomic with respect to every other client.
///
/// The scripts derive `slot:` and `hold:` keys from ids stored in hashes, so
/// this targets a single Redis node (or a primary with replicas), not Redis
/// Cluster.
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
    scripts: Arc<Scripts>,
    clock: Arc<dyn Clock>,
    hold_ttl: Duration,
}

impl RedisStore {
    pub async fn connect(url: &str, clock: Arc<dyn Clock>, hold_ttl: Duration) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        info!("Connected to Redis slot store");
        Ok(Self {
            conn,
            scripts: Arc::new(Scripts::load()),
            clock,
            hold_ttl,
        })
    }

    fn now_ms(&self) -> i64 {
        self.clock.now().timestamp_millis()
    }

    async fn load_slots(&self, ids: &[Uuid]) -> CoreResult<Vec<Slot>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let now = self.now_ms();

        let mut hashes = redis::pipe();
        let mut lapsed = redis::pipe();
        for id in ids {
            hashes.hgetall(slot_key(*id));
            lapsed.zcount(slot_holds_key(*id), "-inf", now);
        }
        let fields: Vec<HashMap<String, String>> = hashes.query_async(&mut conn).await.map_err(store_error)?;
        let counts: Vec<u32> = lapsed.query_async(&mut conn).await.map_err(store_error)?;

        Ok(fields
            .iter()
            .zip(counts)
            .filter_map(|(f, n)| slot_from_hash(f, n))
            .collect())
    }

    async fn slot_ids_between(&self, range: &DateRange) -> CoreResult<Vec<Uuid>> {
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        for day in range.days() {
            pipe.smembers(date_index_key(day));
        }
        let members: Vec<Vec<String>> = pipe.query_async(&mut conn).await.map_err(store_error)?;
        Ok(members.into_iter().flatten().filter_map(|id| id.parse().ok()).collect())
    }

    async fn roster(&self) -> CoreResult<Vec<StylistInfo>> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn.smembers(STYLIST_INDEX_KEY).await.map_err(store_error)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut pipe = redis::pipe();
        for id in &ids {
            pipe.get(stylist_key(id));
        }
        let raw: Vec<Option<String>> = pipe.query_async(&mut conn).await.map_err(store_error)?;
        raw.into_iter()
            .flatten()
            .map(|json| serde_json::from_str(&json).map_err(codec_error))
            .collect()
    }

    async fn read_json<T: serde::de::DeserializeOwned>(&self, key: String) -> CoreResult<Option<T>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(key).await.map_err(store_error)?;
        raw.map(|json| serde_json::from_str(&json).map_err(codec_error)).transpose()
    }

    async fn write_json<T: serde::Serialize>(&self, key: String, value: &T) -> CoreResult<()> {
        let json = serde_json::to_string(value).map_err(codec_error)?;
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(key, json).await.map_err(store_error)
    }

    async fn edit_slot(&self, slot_id: Uuid, op: &str, value: String) -> CoreResult<Slot> {
        let mut conn = self.conn.clone();
        let mut invocation = self.scripts.edit_slot.prepare_invoke();
        invocation
            .key(slot_key(slot_id))
            .key(slot_holds_key(slot_id))
            .arg(self.now_ms())
            .arg(op)
            .arg(value);
        let remaining: i64 = invocation.invoke_async(&mut conn).await.map_err(store_error)?;
        if remaining < 0 {
            return Err(BookingError::NotFound(format!("slot {}", slot_id)));
        }
        self.read_slot(slot_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("slot {}", slot_id)))
    }
}

#[async_trait]
impl ReservationStore for RedisStore {
    async fn reserve(&self, request: &ReserveRequest) -> CoreResult<Hold> {
        let ids = self.slot_ids_between(&DateRange::new(request.date, request.date)?).await?;
        let slots = self.load_slots(&ids).await?;
        let roster = self.roster().await?;
        let candidates = candidate_slots(&slots, request, &roster);
        if candidates.is_empty() {
            return Err(BookingError::SlotUnavailable);
        }
        let service: Option<ServiceInfo> = self.read_json(service_key(&request.service_id)).await?;

        let mut conn = self.conn.clone();
        for candidate in candidates {
            let now = self.clock.now();
            let hold = Hold {
                hold_id: Uuid::new_v4(),
                slot_id: candidate.slot.id,
                service_id: request.service_id.clone(),
                stylist_id: candidate.stylist_id,
                date: request.date,
                start: request.start,
                end: hold_end(&candidate.slot, service.as_ref()),
                expires_at: now + self.hold_ttl,
            };
            let payload = serde_json::to_string(&hold).map_err(codec_error)?;

            let mut invocation = self.scripts.reserve.prepare_invoke();
            invocation
                .key(slot_key(hold.slot_id))
                .key(slot_holds_key(hold.slot_id))
                .key(hold_key(hold.hold_id))
                .arg(now.timestamp_millis())
                .arg(hold.expires_at.timestamp_millis())
                .arg(hold.hold_id.to_string())
                .arg(payload)
                .arg(FINISHED_HOLD_RETENTION_MS)
                .arg(hold.slot_id.to_string());
            let remaining: i64 = invocation.invoke_async(&mut conn).await.map_err(store_error)?;

            if remaining >= 0 {
                info!(
                    "Hold {} placed on slot {} ({} left), expires {}",
                    hold.hold_id, hold.slot_id, remaining, hold.expires_at
                );
                return Ok(hold);
            }
            debug!("Slot {} refused hold (code {}), trying next", hold.slot_id, remaining);
        }
        Err(BookingError::SlotUnavailable)
    }

    async fn release(&self, hold_id: Uuid) -> CoreResult<()> {
        let mut conn = self.conn.clone();
        let mut invocation = self.scripts.release.prepare_invoke();
        invocation
            .key(hold_key(hold_id))
            .arg(self.now_ms())
            .arg(hold_id.to_string());
        let released: i64 = invocation.invoke_async(&mut conn).await.map_err(store_error)?;
        if released == 1 {
            info!("Hold {} released", hold_id);
        } else {
            debug!("Release of hold {} ignored, not active", hold_id);
        }
        Ok(())
    }

    async fn redeem(&self, hold_id: Uuid, customer: &Customer) -> CoreResult<Uuid> {
        let mut conn = self.conn.clone();
        let payload: Option<String> = conn.hget(hold_key(hold_id), "payload").await.map_err(store_error)?;
        let hold: Hold = match payload {
            Some(json) => serde_json::from_str(&json).map_err(codec_error)?,
            None => return Err(BookingError::HoldExpired),
        };

        let mut customer = customer.clone();
        if customer.service_name.is_none() {
            let service: Option<ServiceInfo> = self.read_json(service_key(&hold.service_id)).await?;
            customer.service_name = service.map(|s| s.name);
        }
        if customer.stylist_name.is_none() {
            let stylist: Option<StylistInfo> = self.read_json(stylist_key(&hold.stylist_id)).await?;
            customer.stylist_name = stylist.map(|s| s.name);
        }
        let booking = Booking::from_hold(&hold, customer, self.clock.now());
        let booking_json = serde_json::to_string(&booking).map_err(codec_error)?;

        let mut invocation = self.scripts.redeem.prepare_invoke();
        invocation
            .key(hold_key(hold_id))
            .key(booking_key(booking.id))
            .arg(self.now_ms())
            .arg(hold_id.to_string())
            .arg(booking.id.to_string())
            .arg(booking_json);
        let verdict: String = invocation.invoke_async(&mut conn).await.map_err(store_error)?;

        match verdict.as_str() {
            "ok" => {
                info!("Hold {} redeemed into booking {}", hold_id, booking.id);
                Ok(booking.id)
            }
            "already" => Err(BookingError::HoldAlreadyRedeemed),
            "gone" => Err(BookingError::SlotNoLongerAvailable),
            _ => Err(BookingError::HoldExpired),
        }
    }

    async fn read_slots(&self, range: &DateRange, stylist: &StylistChoice) -> CoreResult<Vec<Slot>> {
        let ids = self.slot_ids_between(range).await?;
        let mut slots: Vec<Slot> = self
            .load_slots(&ids)
            .await?
            .into_iter()
            .filter(|s| stylist.matches(s.stylist_id.as_deref()))
            .collect();
        slots.sort_by(|a, b| {
            (a.date, a.start_time, &a.stylist_id, a.id).cmp(&(b.date, b.start_time, &b.stylist_id, b.id))
        });
        Ok(slots)
    }

    async fn read_slot(&self, slot_id: Uuid) -> CoreResult<Option<Slot>> {
        Ok(self.load_slots(&[slot_id]).await?.into_iter().next())
    }

    async fn read_service(&self, service_id: &str) -> CoreResult<Option<ServiceInfo>> {
        self.read_json(service_key(service_id)).await
    }

    async fn read_stylist(&self, stylist_id: &str) -> CoreResult<Option<StylistInfo>> {
        self.read_json(stylist_key(stylist_id)).await
    }

    async fn read_booking(&self, booking_id: Uuid) -> CoreResult<Option<Booking>> {
        self.read_json(booking_key(booking_id)).await
    }
}

#[async_trait]
impl SlotAdminStore for RedisStore {
    async fn create_slots(&self, slots: Vec<Slot>) -> CoreResult<Vec<Slot>> {
        if slots.is_empty() {
            return Ok(slots);
        }
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic();
        for slot in &slots {
            pipe.hset_multiple(slot_key(slot.id), &slot_fields(slot)).ignore();
            pipe.sadd(date_index_key(slot.date), slot.id.to_string()).ignore();
        }
        let (): () = pipe.query_async(&mut conn).await.map_err(store_error)?;
        info!("Created {} slots", slots.len());

        Ok(slots
            .into_iter()
            .map(|mut s| {
                s.remaining = s.remaining.min(s.capacity);
                s
            })
            .collect())
    }

    async fn set_capacity(&self, slot_id: Uuid, capacity: u32) -> CoreResult<Slot> {
        let slot = self.edit_slot(slot_id, "capacity", capacity.to_string()).await?;
        info!("Slot {} capacity set to {} ({} left)", slot_id, slot.capacity, slot.remaining);
        Ok(slot)
    }

    async fn adjust_remaining(&self, slot_id: Uuid, delta: i64) -> CoreResult<Slot> {
        let slot = self.edit_slot(slot_id, "adjust", delta.to_string()).await?;
        info!("Slot {} remaining adjusted by {} to {}", slot_id, delta, slot.remaining);
        Ok(slot)
    }

    async fn set_open(&self, slot_id: Uuid, is_open: bool) -> CoreResult<Slot> {
        let flag = if is_open { "1" } else { "0" };
        let slot = self.edit_slot(slot_id, "open", flag.to_string()).await?;
        info!("Slot {} is now {}", slot_id, if is_open { "open" } else { "closed" });
        Ok(slot)
    }

    async fn delete_slot(&self, slot_id: Uuid) -> CoreResult<()> {
        let mut conn = self.conn.clone();
        let mut invocation = self.scripts.delete_slot.prepare_invoke();
        invocation
            .key(slot_key(slot_id))
            .key(slot_holds_key(slot_id))
            .arg(slot_id.to_string());
        let deleted: i64 = invocation.invoke_async(&mut conn).await.map_err(store_error)?;
        if deleted == 0 {
            return Err(BookingError::NotFound(format!("slot {}", slot_id)));
        }
        info!("Slot {} deleted", slot_id);
        Ok(())
    }

    async fn upsert_service(&self, service: ServiceInfo) -> CoreResult<()> {
        self.write_json(service_key(&service.id), &service).await
    }

    async fn upsert_stylist(&self, stylist: StylistInfo) -> CoreResult<()> {
        self.write_json(stylist_key(&stylist.id), &stylist).await?;
        let mut conn = self.conn.clone();
        conn.sadd::<_, _, ()>(STYLIST_INDEX_KEY, &stylist.id).await.map_err(store_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot() -> Slot {
        Slot {
            id: Uuid::new_v4(),
            date: NaiveDate::from_ymd_opt(2025, 6, 2).unwrap(),
            start_time: "10:00".parse().unwrap(),
            end_time: "10:30".parse().unwrap(),
            stylist_id: None,
            service_id: "cut".into(),
            capacity: 3,
            remaining: 1,
            is_open: true,
        }
    }

    fn as_hash(slot: &Slot) -> HashMap<String, String> {
        slot_fields(slot).into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    #[test]
    fn test_slot_hash_round_trip_keeps_unassigned_stylist() {
        let s = slot();
        let fields = as_hash(&s);
        assert_eq!(fields["stylist_id"], "");
        assert_eq!(fields["is_open"], "1");
        assert_eq!(slot_from_hash(&fields, 0), Some(s));
    }

    #[test]
    fn test_unpruned_lapses_are_credited_up_to_capacity() {
        let fields = as_hash(&slot());
        assert_eq!(slot_from_hash(&fields, 1).unwrap().remaining, 2);
        assert_eq!(slot_from_hash(&fields, 9).unwrap().remaining, 3);
    }

    #[test]
    fn test_malformed_hash_is_skipped() {
        let mut fields = as_hash(&slot());
        fields.insert("capacity".into(), "lots".into());
        assert!(slot_from_hash(&fields, 0).is_none());
        assert!(slot_from_hash(&HashMap::new(), 0).is_none());
    }

    #[test]
    fn test_key_layout() {
        let id = Uuid::nil();
        assert_eq!(slot_key(id), "slot:00000000-0000-0000-0000-000000000000");
        assert_eq!(slot_holds_key(id), "slot:00000000-0000-0000-0000-000000000000:holds");
        assert_eq!(date_index_key(NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()), "slots:date:2025-06-02");
        assert!(hold_key(id).starts_with("hold:"));
    }

    #[test]
    fn test_scripts_include_prune() {
        let src = format!("{}\n{}", PRUNE_LUA, RESERVE_LUA);
        assert!(src.contains("local function prune"));
        assert!(RESERVE_LUA.contains("prune(KEYS[1], KEYS[2], now)"));
    }
}
