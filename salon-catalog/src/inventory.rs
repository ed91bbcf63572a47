use salon_shared::Slot;
use uuid::Uuid;

/// Capacity accounting on a single slot.
///
/// Every operation keeps `0 <= remaining <= capacity`. Stores apply these
/// inside their own critical section (write lock or script).
pub trait SlotInventory {
    /// Take one unit for a hold.
    fn earmark(&mut self) -> Result<(), InventoryError>;

    /// Give one unit back (hold released or lapsed). Never exceeds capacity.
    fn restore(&mut self);

    /// Admin capacity edit; remaining is clamped to the new capacity.
    fn set_capacity(&mut self, capacity: u32);

    /// Admin +/- on remaining, clamped to `[0, capacity]`.
    fn adjust_remaining(&mut self, delta: i64);
}

impl SlotInventory for Slot {
    fn earmark(&mut self) -> Result<(), InventoryError> {
        if !self.is_open {
            return Err(InventoryError::Closed(self.id));
        }
        if self.remaining == 0 {
            return Err(InventoryError::SoldOut(self.id));
        }
        self.remaining -= 1;
        Ok(())
    }

    fn restore(&mut self) {
        self.remaining = (self.remaining + 1).min(self.capacity);
    }

    fn set_capacity(&mut self, capacity: u32) {
        self.capacity = capacity;
        self.remaining = self.remaining.min(capacity);
    }

    fn adjust_remaining(&mut self, delta: i64) {
        let next = (self.remaining as i64 + delta).clamp(0, self.capacity as i64);
        self.remaining = next as u32;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InventoryError {
    #[error("Slot is closed: {0}")]
    Closed(Uuid),

    #[error("Slot has no remaining capacity: {0}")]
    SoldOut(Uuid),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn slot(capacity: u32) -> Slot {
        Slot {
            id: Uuid::new_v4(),
            date: NaiveDate::from_ymd_opt(2025, 6, 2).unwrap(),
            start_time: "10:00".parse().unwrap(),
            end_time: "10:30".parse().unwrap(),
            stylist_id: Some("alex".into()),
            service_id: "cut".into(),
            capacity,
            remaining: capacity,
            is_open: true,
        }
    }

    #[test]
    fn test_inventory_lifecycle() {
        let mut s = slot(2);

        s.earmark().unwrap();
        s.earmark().unwrap();
        assert_eq!(s.remaining, 0);
        assert_eq!(s.earmark(), Err(InventoryError::SoldOut(s.id)));

        s.restore();
        s.restore();
        s.restore();
        assert_eq!(s.remaining, 2);
        assert!(s.capacity_consistent());
    }

    #[test]
    fn test_closed_slot_cannot_be_earmarked() {
        let mut s = slot(1);
        s.is_open = false;
        assert_eq!(s.earmark(), Err(InventoryError::Closed(s.id)));
        assert_eq!(s.remaining, 1);
    }

    #[test]
    fn test_capacity_edits_clamp_remaining() {
        let mut s = slot(4);
        s.set_capacity(2);
        assert_eq!((s.capacity, s.remaining), (2, 2));

        s.set_capacity(0);
        assert_eq!(s.remaining, 0);

        s.set_capacity(3);
        assert_eq!(s.remaining, 0);
        s.adjust_remaining(10);
        assert_eq!(s.remaining, 3);
        s.adjust_remaining(-5);
        assert_eq!(s.remaining, 0);
    }
}
