pub mod schedule;
pub mod inventory;

pub use schedule::{daily_slots, ScheduleError, SlotTemplate, WeekPlan};
pub use inventory::{InventoryError, SlotInventory};
