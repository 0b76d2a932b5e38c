use parking_lot::RwLock;
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

use crate::error::ErrorCode;
use crate::playback::PlayerState;
use crate::record::{Record, RecordId};
use crate::recorder::RecorderState;

/// Import progress milestones
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStage {
    Copying,
    ReadingInfo,
    Saving,
}

/// Everything the observer can be told
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Full UI state, sent on attach
    Restored {
        recorder: RecorderState,
        duration_ms: u64,
        amplitudes: Vec<i32>,
        playback: PlayerState,
        position_ms: u64,
    },

    RecordingStarted { path: PathBuf },
    RecordingPaused { duration_ms: u64 },
    RecordingResumed,
    RecordingStopped,
    RecordingProgress { duration_ms: u64, amplitude: i32 },
    /// The user asked to discard the running capture; waiting for confirmation
    ConfirmDiscard,

    PlaybackStarted { position_ms: u64 },
    PlaybackPaused { position_ms: u64 },
    PlaybackProgress { position_ms: u64 },
    PlaybackStopped,

    ImportStarted { name: String },
    ImportProgress { stage: ImportStage },
    ImportFinished,

    RecordLoaded { record: Record },
    RecordCleared,
    RecordRenamed { id: RecordId, name: String },
    RecordDeleted { id: RecordId, forever: bool },
    RecordInfo { record: Record },
    RecordsLost { ids: Vec<RecordId> },
    AskRename { id: RecordId, name: String },
    Information { line: String },

    ProgressShown,
    ProgressHidden,
    KeepScreenOn { enabled: bool },
    FirstRun,
    LegacyStorageFound { dir: PathBuf },

    Error { code: ErrorCode, message: String },
}

impl SessionEvent {
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        SessionEvent::Error {
            code,
            message: message.into(),
        }
    }
}

/// The transient UI consumer of a session
pub trait SessionObserver: Send + Sync {
    fn notify(&self, event: SessionEvent);
}

impl<F> SessionObserver for F
where
    F: Fn(SessionEvent) + Send + Sync,
{
    fn notify(&self, event: SessionEvent) {
        self(event)
    }
}

/// Observer generation captured when work is scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Generation(u64);

/// Replaceable, nullable observer slot
///
/// Every attach or detach bumps the generation. Notifications carry the
/// generation they were scheduled under and are dropped when it is stale,
/// so work finishing after a detach never reaches a newer observer.
pub struct ObserverBinding {
    observer: RwLock<Option<Arc<dyn SessionObserver>>>,
    generation: AtomicU64,
}

impl ObserverBinding {
    pub fn new() -> Self {
        Self {
            observer: RwLock::new(None),
            generation: AtomicU64::new(0),
        }
    }

    pub fn attach(&self, observer: Arc<dyn SessionObserver>) -> Generation {
        let mut slot = self.observer.write();
        *slot = Some(observer);
        Generation(self.generation.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn detach(&self) {
        let mut slot = self.observer.write();
        *slot = None;
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub fn current(&self) -> Generation {
        Generation(self.generation.load(Ordering::SeqCst))
    }

    pub fn is_attached(&self) -> bool {
        self.observer.read().is_some()
    }

    /// Deliver `event` if `generation` is still current and an observer is attached
    pub fn notify(&self, generation: Generation, event: SessionEvent) {
        let observer = {
            let slot = self.observer.read();
            if self.generation.load(Ordering::SeqCst) != generation.0 {
                debug!("Dropping stale notification {:?}", event);
                return;
            }
            slot.clone()
        };

        let Some(observer) = observer else {
            return;
        };

        if catch_unwind(AssertUnwindSafe(|| observer.notify(event))).is_err() {
            error!("Observer panicked while handling a notification");
        }
    }
}

impl Default for ObserverBinding {
    fn default() -> Self {
        Self::new()
    }
}
