use super::handlers;
use super::state::AppState;
use super::ws;
use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    let recordings = ServeDir::new(state.store.root().to_path_buf());

    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Discrete chunk uploads + finish
        .route("/api/recorder/chunks", post(handlers::upload_chunk))
        .route("/api/recorder/finish", post(handlers::finish_recording))
        // Session queries and teardown
        .route(
            "/api/recorder/sessions/:session_id/status",
            get(handlers::session_status),
        )
        .route(
            "/api/recorder/sessions/:session_id",
            delete(handlers::delete_session),
        )
        // Persistent duplex carrier
        .route("/ws", get(ws::ws_handler))
        // Merged artifacts
        .nest_service("/recordings", recordings)
        // Raw chunk bodies can exceed the default limit
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
