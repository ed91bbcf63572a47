use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use salon_api::{app, worker, AppState, AuthConfig};
use salon_core::{Clock, SystemClock};
use salon_store::{seed_reference_data, Config, MemoryStore, RedisStore, StoreBackend};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "salon_api=debug,salon_store=debug,salon_core=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!(
        "Starting salon API on port {} ({:?} store, {}s holds)",
        config.server.port,
        config.store.backend,
        config.holds.ttl_seconds
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let auth = AuthConfig { secret: config.auth.jwt_secret.clone() };

    let state = match config.store.backend {
        StoreBackend::Memory => {
            let store = Arc::new(MemoryStore::new(clock.clone(), config.hold_ttl()));
            tokio::spawn(worker::run_hold_sweeper(
                store.clone(),
                Duration::from_secs(config.holds.sweep_interval_seconds),
            ));
            AppState::new(store, clock, config.availability.clone(), auth)
        }
        StoreBackend::Redis => {
            let url = config
                .store
                .redis_url
                .as_deref()
                .context("store.redis_url is required for the redis backend")?;
            let store = RedisStore::connect(url, clock.clone(), config.hold_ttl())
                .await
                .context("Failed to connect to Redis")?;
            AppState::new(Arc::new(store), clock, config.availability.clone(), auth)
        }
    };

    if config.store.seed_demo {
        seed_reference_data(state.admin.as_ref()).await.context("Failed to seed reference data")?;
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state)).await?;
    Ok(())
}
