//! Playback of the active record
//!
//! The orchestrator drives playback through [`PlaybackEngine`] directly from
//! intent handlers; these calls are cheap and never touch the record store.

mod clock;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

pub use clock::ClockPlayer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("cannot play {0}: file not found")]
    NotFound(PathBuf),

    #[error("playback failed: {0}")]
    Failed(String),
}

/// Callbacks emitted by a playback engine
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    /// Playback began or continued after a pause
    Started { position_ms: u64 },
    Paused { position_ms: u64 },
    Progress { position_ms: u64 },
    /// Stopped explicitly or reached the end
    Stopped,
    Error(PlaybackError),
}

pub type PlaybackListener = Arc<dyn Fn(PlaybackEvent) + Send + Sync>;

pub trait PlaybackEngine: Send + Sync {
    fn set_listener(&self, listener: Option<PlaybackListener>);

    /// Play `path` from the beginning
    fn play(&self, path: &Path, duration_ms: u64) -> Result<(), PlaybackError>;

    fn pause(&self);

    fn unpause(&self);

    fn seek(&self, position_ms: u64);

    fn stop(&self);

    fn state(&self) -> PlayerState;

    fn position_ms(&self) -> u64;

    /// Path currently loaded, if any
    fn current_path(&self) -> Option<PathBuf>;

    fn is_playing(&self) -> bool {
        self.state() == PlayerState::Playing
    }

    fn is_paused(&self) -> bool {
        self.state() == PlayerState::Paused
    }

    /// Release any resources; the engine stays usable
    fn release(&self) {
        self.stop();
    }
}
