use serde::Serialize;
use tokio::time::Instant;

use crate::playback::PlayerState;
use crate::record::Record;
use crate::recorder::RecorderState;

/// UI-facing session state, owned by the callback context
#[derive(Debug)]
pub struct SessionState {
    /// Record currently shown to the observer
    pub active: Option<Record>,

    /// Amplitudes sampled since the capture started
    pub recording_amplitudes: Vec<i32>,

    /// Discard requested while recording; confirm once the pause lands
    pub discard_pending: bool,
    /// Delete the capture instead of keeping it when it stops
    pub delete_on_stop: bool,

    pub last_info_refresh: Option<Instant>,
    pub progress_listening: bool,
    pub import_in_progress: bool,
    pub migration_started: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            active: None,
            recording_amplitudes: Vec::new(),
            discard_pending: false,
            delete_on_stop: false,
            last_info_refresh: None,
            progress_listening: true,
            import_in_progress: false,
            migration_started: false,
        }
    }
}

/// Point-in-time view of a session
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub attached: bool,
    pub recorder: RecorderState,
    pub recording_duration_ms: u64,
    pub playback: PlayerState,
    pub position_ms: u64,
    pub active: Option<Record>,
    pub import_in_progress: bool,
}
