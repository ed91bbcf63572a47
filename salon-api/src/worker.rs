use std::sync::Arc;
use std::time::Duration;
use salon_store::MemoryStore;
use tracing::{debug, info};

/// Lapses expired holds on a fixed interval so their capacity comes back
/// before the next write touches the slot. Redis prunes inside its scripts
/// and needs no sweeper.
pub async fn run_hold_sweeper(store: Arc<MemoryStore>, every: Duration) {
    info!("Hold sweeper started, every {:?}", every);
    let mut ticker = tokio::time::interval(every);
    loop {
        ticker.tick().await;
        match store.sweep_expired().await {
            0 => debug!("Sweeper found no expired holds"),
            n => info!("Sweeper lapsed {} expired holds ({} still active)", n, store.active_holds().await),
        }
    }
}
