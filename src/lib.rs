pub mod audio;
pub mod config;
pub mod error;
pub mod http;
pub mod nats;
pub mod playback;
pub mod queue;
pub mod record;
pub mod recorder;
pub mod session;
pub mod storage;

pub use audio::{AudioFile, FileReplaySource, MetadataDecoder, SymphoniaDecoder, WavCaptureDevice};
pub use config::Config;
pub use error::{ErrorCode, SessionError};
pub use http::{create_router, AppState};
pub use nats::{CommitForwarder, NatsClient, RecordCommitMessage};
pub use playback::{ClockPlayer, PlaybackEngine};
pub use record::{Record, RecordId, RecordInfo};
pub use recorder::{EngineConfig, RecordingEngine};
pub use session::{
    Collaborators, RecordCommitted, SessionConfig, SessionEvent, SessionObserver,
    SessionOrchestrator,
};
pub use storage::{JsonRecordStore, JsonSettings, LocalFileStore};
