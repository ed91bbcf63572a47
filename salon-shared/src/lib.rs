pub mod models;
pub mod pii;
pub mod time;

pub use models::{
    Booking, BookingStatus, Customer, Hold, ServiceInfo, Slot, SlotEvent, SlotEventKind, SlotRef,
    StylistChoice, StylistInfo,
};
pub use pii::Masked;
pub use time::WallTime;
