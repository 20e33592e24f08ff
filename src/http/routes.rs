use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Call session control
        .route("/calls", post(handlers::start_call))
        .route("/calls/:call_id", get(handlers::get_call))
        .route("/calls/:call_id/connect", post(handlers::connect_call))
        .route(
            "/calls/:call_id/disconnect",
            post(handlers::disconnect_call),
        )
        .route(
            "/calls/:call_id/profanity",
            post(handlers::record_profanity),
        )
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
