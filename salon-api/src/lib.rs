use axum::{http::Method, routing::get, Json, Router};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod admin;
pub mod availability;
pub mod bookings;
pub mod error;
pub mod holds;
pub mod middleware;
pub mod reference;
pub mod state;
pub mod worker;

pub use error::AppError;
pub use state::{AppState, AuthConfig};

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    let admin = admin::routes().route_layer(axum::middleware::from_fn_with_state(
        state.clone(),
        middleware::admin_auth_middleware,
    ));

    Router::new()
        .route("/health", get(health))
        .merge(holds::routes())
        .merge(bookings::routes())
        .merge(availability::routes())
        .merge(reference::routes())
        .nest("/v1/admin", admin)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
