use std::sync::Arc;
use tracing::debug;

use super::observer::{Generation, SessionEvent};
use super::orchestrator::{SessionOrchestrator, Shared};
use super::state::SessionState;
use crate::error::ErrorCode;
use crate::playback::{PlaybackEvent, PlayerState};

impl SessionOrchestrator {
    /// Play, pause or continue the active record
    pub fn toggle_playback(&self) {
        self.shared.post(|shared, state| {
            if shared.engine.is_recording() {
                debug!("Playback is unavailable while recording");
                return;
            }

            match shared.player.state() {
                PlayerState::Playing => shared.player.pause(),
                PlayerState::Paused => shared.player.unpause(),
                PlayerState::Stopped => match &state.active {
                    // Failures come back through the player's error callback
                    Some(record) => {
                        let _ = shared.player.play(&record.path, record.duration_ms);
                    }
                    None => debug!("No active record to play"),
                },
            }
        });
    }

    pub fn seek_playback(&self, position_ms: u64) {
        self.shared
            .post(move |shared, _| shared.player.seek(position_ms));
    }

    pub fn stop_playback(&self) {
        self.shared.post(|shared, _| shared.player.stop());
    }

    /// Pause for an external interruption such as an output device change
    pub fn pause_playback(&self) {
        self.shared.post(|shared, _| {
            if shared.player.state() == PlayerState::Playing {
                shared.player.pause();
            }
        });
    }

    /// Mute progress notifications, e.g. while the user scrubs
    pub fn set_playback_progress_listening(&self, listening: bool) {
        self.shared
            .post(move |_, state| state.progress_listening = listening);
    }
}

pub(super) fn handle_playback_event(
    shared: &Arc<Shared>,
    state: &mut SessionState,
    generation: Generation,
    event: PlaybackEvent,
) {
    let event = match event {
        PlaybackEvent::Started { position_ms } => SessionEvent::PlaybackStarted { position_ms },
        PlaybackEvent::Paused { position_ms } => SessionEvent::PlaybackPaused { position_ms },
        PlaybackEvent::Progress { position_ms } => {
            if !state.progress_listening {
                return;
            }
            SessionEvent::PlaybackProgress { position_ms }
        }
        PlaybackEvent::Stopped => SessionEvent::PlaybackStopped,
        PlaybackEvent::Error(e) => SessionEvent::error(ErrorCode::Playback, e.to_string()),
    };
    shared.notify(generation, event);
}
