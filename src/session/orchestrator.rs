use anyhow::Result;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::commit::{CommitKind, RecordCommitted};
use super::config::SessionConfig;
use super::context::CallbackContext;
use super::info::information_line;
use super::observer::{Generation, ObserverBinding, SessionEvent, SessionObserver};
use super::state::{SessionSnapshot, SessionState};
use super::{maintenance, playback, recording, records};
use crate::audio::MetadataDecoder;
use crate::error::{ErrorCode, SessionError};
use crate::playback::{PlaybackEngine, PlayerState};
use crate::queue::{TaskQueue, TaskQueues};
use crate::record::Record;
use crate::recorder::{CaptureDevice, EngineConfig, RecordingEngine};
use crate::storage::{FileStore, RecordStore, SettingsStore};

/// Version of the stored metadata layout; older stores are migrated on attach
pub const METADATA_MIGRATION_VERSION: u32 = 3;

/// External collaborators a session is built from
pub struct Collaborators {
    pub device: Box<dyn CaptureDevice>,
    pub engine: EngineConfig,
    pub player: Arc<dyn PlaybackEngine>,
    pub records: Arc<dyn RecordStore>,
    pub files: Arc<dyn FileStore>,
    pub decoder: Arc<dyn MetadataDecoder>,
    pub settings: Arc<dyn SettingsStore>,
}

/// A failed operation as the observer sees it
#[derive(Debug)]
pub(super) struct Failure {
    pub code: ErrorCode,
    pub message: String,
}

impl Failure {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn into_event(self) -> SessionEvent {
        SessionEvent::Error {
            code: self.code,
            message: self.message,
        }
    }
}

impl From<SessionError> for Failure {
    fn from(error: SessionError) -> Self {
        Self::new(error.code(), error.to_string())
    }
}

pub(super) struct Shared {
    pub config: SessionConfig,
    pub engine: RecordingEngine,
    pub player: Arc<dyn PlaybackEngine>,
    pub records: Arc<dyn RecordStore>,
    pub files: Arc<dyn FileStore>,
    pub decoder: Arc<dyn MetadataDecoder>,
    pub settings: Arc<dyn SettingsStore>,
    pub queues: TaskQueues,
    pub binding: ObserverBinding,
    pub context: CallbackContext,
    pub commits: broadcast::Sender<RecordCommitted>,
    lost_forwarder: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    /// Run `callback` on the callback context
    pub fn post<F>(self: &Arc<Self>, callback: F)
    where
        F: FnOnce(&Arc<Shared>, &mut SessionState) + Send + 'static,
    {
        let shared = Arc::clone(self);
        self.context.post(move |state| callback(&shared, state));
    }

    /// Deliver `event` if the observer of `generation` is still attached
    pub fn notify(&self, generation: Generation, event: SessionEvent) {
        self.binding.notify(generation, event);
    }

    /// Post a failure notification from a queue item
    pub fn report(self: &Arc<Self>, generation: Generation, failure: Failure) {
        warn!("{:?}: {}", failure.code, failure.message);
        self.post(move |shared, _| shared.notify(generation, failure.into_event()));
    }

    /// Announce a durable record mutation to downstream consumers
    pub fn publish(&self, kind: CommitKind, record: &Record) {
        debug!("Publishing {:?} commit for record {}", kind, record.id);
        // No subscribers is fine
        let _ = self.commits.send(RecordCommitted::new(kind, record));
    }

    pub fn notify_loaded(&self, generation: Generation, record: &Record) {
        self.notify(
            generation,
            SessionEvent::RecordLoaded {
                record: record.clone(),
            },
        );
        self.notify(
            generation,
            SessionEvent::Information {
                line: information_line(record.size, &record.format, record.sample_rate),
            },
        );
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Some(forwarder) = self.lost_forwarder.lock().take() {
            forwarder.abort();
        }
    }
}

/// Submit `work` to `queue`, logging if the queue is already closed
pub(super) fn enqueue<F>(queue: &TaskQueue, work: F)
where
    F: Future<Output = Result<()>> + Send + 'static,
{
    if let Err(e) = queue.submit(work) {
        warn!("Dropping work: {}", e);
    }
}

/// Coordinates one recording/playback session against storage
///
/// Intents return immediately. Engine and player calls happen on the
/// callback context, storage work on the task queues, and every outcome
/// reaches the attached observer (if any) through the callback context.
#[derive(Clone)]
pub struct SessionOrchestrator {
    pub(super) shared: Arc<Shared>,
}

impl SessionOrchestrator {
    /// Build a session; must be called from within a tokio runtime
    pub fn new(parts: Collaborators, config: SessionConfig) -> Self {
        info!("Creating session orchestrator: {}", config.session_id);

        let engine = RecordingEngine::new(parts.device, parts.engine);
        let (commits, _) = broadcast::channel(64);

        let shared = Arc::new(Shared {
            config,
            engine,
            player: parts.player,
            records: parts.records,
            files: parts.files,
            decoder: parts.decoder,
            settings: parts.settings,
            queues: TaskQueues::new(),
            binding: ObserverBinding::new(),
            context: CallbackContext::new(SessionState::default()),
            commits,
            lost_forwarder: Mutex::new(None),
        });

        // Engine and player callbacks stay registered for the life of the
        // session so bookkeeping (persisting a stopped capture) never depends
        // on an observer being attached. Only notifications are gated.
        let weak = Arc::downgrade(&shared);
        shared.engine.set_listener(Some(Arc::new(move |event| {
            if let Some(shared) = weak.upgrade() {
                let generation = shared.binding.current();
                shared.post(move |shared, state| {
                    recording::handle_recorder_event(shared, state, generation, event)
                });
            }
        })));

        let weak = Arc::downgrade(&shared);
        shared.player.set_listener(Some(Arc::new(move |event| {
            if let Some(shared) = weak.upgrade() {
                let generation = shared.binding.current();
                shared.post(move |shared, state| {
                    playback::handle_playback_event(shared, state, generation, event)
                });
            }
        })));

        let forwarder = spawn_lost_forwarder(&shared);
        *shared.lost_forwarder.lock() = Some(forwarder);

        Self { shared }
    }

    /// Bind `observer` and replay the current state to it
    pub fn attach(&self, observer: Arc<dyn SessionObserver>) {
        let generation = self.shared.binding.attach(observer);
        info!("Observer attached to session {}", self.shared.config.session_id);
        self.shared
            .post(move |shared, state| restore(shared, state, generation));
    }

    /// Unbind the observer; queued work continues silently
    pub fn detach(&self) {
        self.shared.binding.detach();
        info!("Observer detached from session {}", self.shared.config.session_id);
    }

    pub fn is_attached(&self) -> bool {
        self.shared.binding.is_attached()
    }

    pub fn subscribe_commits(&self) -> broadcast::Receiver<RecordCommitted> {
        self.shared.commits.subscribe()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let (active, import_in_progress) = self
            .shared
            .context
            .query(|state| (state.active.clone(), state.import_in_progress))
            .await
            .unwrap_or((None, false));

        self.build_snapshot(active, import_in_progress)
    }

    fn build_snapshot(&self, active: Option<Record>, import_in_progress: bool) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.shared.config.session_id.clone(),
            attached: self.shared.binding.is_attached(),
            recorder: self.shared.engine.state(),
            recording_duration_ms: self.shared.engine.duration_ms(),
            playback: self.shared.player.state(),
            position_ms: self.shared.player.position_ms(),
            active,
            import_in_progress,
        }
    }

    /// Wait until the callback context and every queue have nothing left to do
    pub async fn settle(&self) {
        loop {
            self.shared.context.flush().await;
            for queue in self.shared.queues.all() {
                // A closed queue has nothing left to flush
                let _ = queue.flush().await;
            }
            self.shared.context.flush().await;

            if self.shared.context.is_idle() && self.shared.queues.is_idle() {
                break;
            }
        }
    }

    /// Detach, finish any capture, and drain-then-close every queue
    pub async fn shutdown(&self) {
        info!("Shutting down session {}", self.shared.config.session_id);
        self.detach();

        if self.shared.engine.is_recording() {
            if let Err(e) = self.shared.engine.stop() {
                warn!("Failed to stop recording on shutdown: {}", e);
            }
        }
        self.shared.player.stop();

        self.settle().await;
        self.shared.queues.close().await;
        info!("Session {} shut down", self.shared.config.session_id);
    }
}

/// Replay the session to a freshly attached observer
fn restore(shared: &Arc<Shared>, state: &mut SessionState, generation: Generation) {
    maintenance::schedule_rename_default(shared);

    let recording = shared.engine.is_recording();
    shared.notify(
        generation,
        SessionEvent::Restored {
            recorder: shared.engine.state(),
            duration_ms: if recording { shared.engine.duration_ms() } else { 0 },
            amplitudes: if recording {
                state.recording_amplitudes.clone()
            } else {
                Vec::new()
            },
            playback: shared.player.state(),
            position_ms: shared.player.position_ms(),
        },
    );

    if recording {
        shared.notify(
            generation,
            SessionEvent::KeepScreenOn {
                enabled: shared.settings.keep_screen_on(),
            },
        );
    }

    match &state.active {
        Some(record) => {
            shared.notify_loaded(generation, record);
            if shared.player.state() == PlayerState::Paused {
                shared.notify(
                    generation,
                    SessionEvent::PlaybackPaused {
                        position_ms: shared.player.position_ms(),
                    },
                );
            }
        }
        None if !recording => records::schedule_load(shared, generation),
        None => {}
    }

    if !state.migration_started && shared.settings.migration_version() < METADATA_MIGRATION_VERSION {
        state.migration_started = true;
        maintenance::schedule_migration(shared);
    }
}

fn spawn_lost_forwarder(shared: &Arc<Shared>) -> JoinHandle<()> {
    let mut lost = shared.records.subscribe_lost();
    let weak: Weak<Shared> = Arc::downgrade(shared);

    tokio::spawn(async move {
        loop {
            let records = match lost.recv().await {
                Ok(records) => records,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Missed {} lost-record notifications", n);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };

            let Some(shared) = weak.upgrade() else {
                break;
            };
            let generation = shared.binding.current();
            let ids = records.iter().map(|r| r.id).collect();
            shared.post(move |shared, _| shared.notify(generation, SessionEvent::RecordsLost { ids }));
        }
    })
}
