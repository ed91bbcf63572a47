use salon_core::{CoreResult, SlotAdminStore};
use salon_shared::{ServiceInfo, StylistInfo};
use tracing::info;

/// Minimal catalog so a fresh store can take bookings.
pub fn demo_services() -> Vec<ServiceInfo> {
    vec![
        ServiceInfo { id: "cut-style".into(), name: "Cut & Style".into(), duration_minutes: 30, price: 49.0 },
        ServiceInfo { id: "color-style".into(), name: "Color + Style".into(), duration_minutes: 60, price: 99.0 },
        ServiceInfo { id: "kids-cut".into(), name: "Kids Cut".into(), duration_minutes: 20, price: 29.0 },
    ]
}

pub fn demo_stylists() -> Vec<StylistInfo> {
    vec![
        StylistInfo { id: "alex".into(), name: "Alex Morgan".into(), active: true },
        StylistInfo { id: "priya".into(), name: "Priya Sharma".into(), active: true },
        StylistInfo { id: "jason".into(), name: "Jason Lee".into(), active: true },
    ]
}

pub async fn seed_reference_data(store: &dyn SlotAdminStore) -> CoreResult<()> {
    let services = demo_services();
    let stylists = demo_stylists();
    let counts = (services.len(), stylists.len());
    for service in services {
        store.upsert_service(service).await?;
    }
    for stylist in stylists {
        store.upsert_stylist(stylist).await?;
    }
    info!("Seeded {} services and {} stylists", counts.0, counts.1);
    Ok(())
}
