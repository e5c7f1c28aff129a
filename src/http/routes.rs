use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Devices
        .route("/devices", get(handlers::list_devices))
        .route("/devices/:device_id/trigger", post(handlers::trigger_device))
        .route("/devices/:device_id/result", get(handlers::get_device_result))
        // Sessions
        .route("/sessions/:session_id", get(handlers::get_session))
        .route("/sessions/:session_id/cancel", post(handlers::cancel_session))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
