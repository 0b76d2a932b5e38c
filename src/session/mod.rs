//! Session orchestration
//!
//! This module provides the `SessionOrchestrator` that binds one recording
//! engine, one playback engine and the storage collaborators together:
//! - intents from the UI translated into engine calls and queued storage work
//! - a single callback context owning the active record and UI-facing state
//! - a generation-counted observer binding that survives detach/reattach
//! - two-phase import, rename with rollback, trash / permanent delete
//! - commit notifications for downstream consumers

mod commit;
mod config;
mod context;
mod import;
mod info;
mod maintenance;
mod observer;
mod orchestrator;
mod playback;
mod recording;
mod records;
mod state;

pub use commit::{CommitKind, RecordCommitted};
pub use config::SessionConfig;
pub use context::CallbackContext;
pub use info::{format_sample_rate, format_size, information_line};
pub use observer::{Generation, ImportStage, ObserverBinding, SessionEvent, SessionObserver};
pub use orchestrator::{Collaborators, SessionOrchestrator, METADATA_MIGRATION_VERSION};
pub use state::{SessionSnapshot, SessionState};
