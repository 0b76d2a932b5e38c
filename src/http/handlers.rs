use super::state::AppState;
use crate::record::RecordId;
use crate::session::{SessionEvent, SessionSnapshot};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StopRecordingRequest {
    /// Discard the capture instead of saving it
    #[serde(default)]
    pub delete: bool,
}

#[derive(Debug, Deserialize)]
pub struct SeekRequest {
    pub position_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    #[serde(default)]
    pub forever: bool,
}

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    pub path: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    pub status: &'static str,
    pub intent: &'static str,
}

fn accepted(intent: &'static str) -> impl IntoResponse {
    info!("Accepted intent: {}", intent);
    (
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            status: "accepted",
            intent,
        }),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /session
/// Snapshot of recorder, playback and the active record
pub async fn get_session(State(state): State<AppState>) -> Json<SessionSnapshot> {
    Json(state.session.snapshot().await)
}

/// GET /events
/// Most recent observer events, oldest first
pub async fn get_events(State(state): State<AppState>) -> Json<Vec<SessionEvent>> {
    Json(state.events.recent())
}

/// POST /recording/start
pub async fn start_recording(State(state): State<AppState>) -> impl IntoResponse {
    state.session.start_recording();
    accepted("start_recording")
}

/// POST /recording/pause
/// Toggles between paused and recording
pub async fn pause_resume_recording(State(state): State<AppState>) -> impl IntoResponse {
    state.session.pause_resume_recording();
    accepted("pause_resume_recording")
}

/// POST /recording/stop
pub async fn stop_recording(
    State(state): State<AppState>,
    body: Option<Json<StopRecordingRequest>>,
) -> impl IntoResponse {
    let delete = body.map(|Json(req)| req.delete).unwrap_or(false);
    state.session.stop_recording(delete);
    accepted("stop_recording")
}

/// POST /recording/cancel
pub async fn cancel_recording(State(state): State<AppState>) -> impl IntoResponse {
    state.session.cancel_recording();
    accepted("cancel_recording")
}

/// POST /playback/toggle
pub async fn toggle_playback(State(state): State<AppState>) -> impl IntoResponse {
    state.session.toggle_playback();
    accepted("toggle_playback")
}

/// POST /playback/seek
pub async fn seek_playback(
    State(state): State<AppState>,
    Json(req): Json<SeekRequest>,
) -> impl IntoResponse {
    state.session.seek_playback(req.position_ms);
    accepted("seek_playback")
}

/// POST /playback/stop
pub async fn stop_playback(State(state): State<AppState>) -> impl IntoResponse {
    state.session.stop_playback();
    accepted("stop_playback")
}

/// POST /records/:id/rename
pub async fn rename_record(
    State(state): State<AppState>,
    Path(id): Path<RecordId>,
    Json(req): Json<RenameRequest>,
) -> impl IntoResponse {
    state.session.rename_record(id, &req.name);
    accepted("rename_record")
}

/// POST /records/:id/delete
pub async fn delete_record(
    State(state): State<AppState>,
    Path(id): Path<RecordId>,
    body: Option<Json<DeleteRequest>>,
) -> impl IntoResponse {
    let forever = body.map(|Json(req)| req.forever).unwrap_or(false);
    state.session.delete_record(id, forever);
    accepted("delete_record")
}

/// POST /records/:id/decode
/// Rebuild the waveform from the audio file
pub async fn decode_record(
    State(state): State<AppState>,
    Path(id): Path<RecordId>,
) -> impl IntoResponse {
    state.session.decode_record(id);
    accepted("decode_record")
}

/// POST /records/active/info
pub async fn show_record_info(State(state): State<AppState>) -> impl IntoResponse {
    state.session.show_record_info();
    accepted("show_record_info")
}

/// POST /import
pub async fn import_file(
    State(state): State<AppState>,
    Json(req): Json<ImportRequest>,
) -> impl IntoResponse {
    state.session.import_file(req.path);
    accepted("import_file")
}
