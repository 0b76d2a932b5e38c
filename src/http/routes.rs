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
        // Session queries
        .route("/session", get(handlers::get_session))
        .route("/events", get(handlers::get_events))
        // Recording control
        .route("/recording/start", post(handlers::start_recording))
        .route("/recording/pause", post(handlers::pause_resume_recording))
        .route("/recording/stop", post(handlers::stop_recording))
        .route("/recording/cancel", post(handlers::cancel_recording))
        // Playback control
        .route("/playback/toggle", post(handlers::toggle_playback))
        .route("/playback/seek", post(handlers::seek_playback))
        .route("/playback/stop", post(handlers::stop_playback))
        // Records
        .route("/records/active/info", post(handlers::show_record_info))
        .route("/records/:id/rename", post(handlers::rename_record))
        .route("/records/:id/delete", post(handlers::delete_record))
        .route("/records/:id/decode", post(handlers::decode_record))
        .route("/import", post(handlers::import_file))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
