use anyhow::Result;
use chrono::Local;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::commit::CommitKind;
use super::info::information_line;
use super::observer::{Generation, SessionEvent};
use super::orchestrator::{enqueue, Failure, SessionOrchestrator, Shared};
use super::records::schedule_decode;
use super::state::SessionState;
use crate::audio::waveform;
use crate::error::{ErrorCode, SessionError};
use crate::playback::PlayerState;
use crate::record::{Record, RecordInfo};
use crate::recorder::{CaptureParams, RecorderEvent, RecorderState};

impl SessionOrchestrator {
    /// Start a new capture into a fresh file
    pub fn start_recording(&self) {
        let generation = self.shared.binding.current();
        self.shared.post(move |shared, state| {
            if shared.engine.is_recording() {
                warn!("Recording already in progress");
                return;
            }
            if shared.player.state() != PlayerState::Stopped {
                shared.player.stop();
            }
            state.delete_on_stop = false;
            state.discard_pending = false;
            enqueue(
                &shared.queues.recordings,
                prepare_recording(Arc::clone(shared), generation),
            );
        });
    }

    /// Pause a running capture or resume a paused one
    pub fn pause_resume_recording(&self) {
        let generation = self.shared.binding.current();
        self.shared.post(move |shared, state| {
            state.discard_pending = false;
            match shared.engine.state() {
                RecorderState::Recording => {
                    if let Err(e) = shared.engine.pause() {
                        debug!("Pause failed: {}", e);
                    }
                }
                RecorderState::Paused => enqueue(
                    &shared.queues.recordings,
                    resume_recording(Arc::clone(shared), generation),
                ),
                other => debug!("Nothing to pause or resume while {:?}", other),
            }
        });
    }

    /// Stop the capture; with `delete` the captured file is discarded
    pub fn stop_recording(&self, delete: bool) {
        self.shared.post(move |shared, state| {
            state.discard_pending = false;
            state.delete_on_stop = delete && shared.engine.is_recording();
            if let Err(e) = shared.engine.stop() {
                debug!("Stop failed: {}", e);
            }
        });
    }

    /// Ask to discard the running capture
    ///
    /// While paused the observer is asked to confirm right away. While
    /// recording the capture is paused first and the confirmation follows
    /// the pause. Confirming means calling `stop_recording(true)`.
    pub fn cancel_recording(&self) {
        let generation = self.shared.binding.current();
        self.shared.post(move |shared, state| match shared.engine.state() {
            RecorderState::Paused => shared.notify(generation, SessionEvent::ConfirmDiscard),
            RecorderState::Recording if shared.engine.supports_pause() => {
                state.discard_pending = true;
                if let Err(e) = shared.engine.pause() {
                    state.discard_pending = false;
                    debug!("Pause before discard failed: {}", e);
                }
            }
            RecorderState::Recording => shared.notify(generation, SessionEvent::ConfirmDiscard),
            other => debug!("Nothing to cancel while {:?}", other),
        });
    }
}

async fn prepare_recording(shared: Arc<Shared>, generation: Generation) -> Result<()> {
    if shared.engine.is_recording() {
        debug!("Recording started meanwhile, skipping");
        return Ok(());
    }

    match shared.files.has_available_space().await {
        Ok(true) => {}
        Ok(false) => {
            shared.report(generation, SessionError::StorageExhausted.into());
            return Ok(());
        }
        Err(e) => {
            shared.report(generation, Failure::new(ErrorCode::StorageAccess, format!("{:#}", e)));
            return Ok(());
        }
    }

    let settings = shared.settings.snapshot();
    let name = format!("Record-{}", Local::now().format("%Y%m%d-%H%M%S"));
    let output = match shared.files.provide_output_file(&name, &settings.format).await {
        Ok(output) => output,
        Err(e) => {
            let error = SessionError::classify(&e, SessionError::InvalidOutputFile);
            shared.report(generation, error.into());
            return Ok(());
        }
    };

    let params = CaptureParams {
        channel_count: settings.channel_count,
        sample_rate: settings.sample_rate,
        bitrate: settings.bitrate,
    };

    // Start failures reach the observer through the engine's error callback
    if let Err(e) = shared.engine.start(&output, params) {
        warn!("Recording did not start: {}", e);
        if let Err(e) = shared.files.delete_file(&output).await {
            warn!("Failed to remove unused output file: {:#}", e);
        }
    }

    Ok(())
}

async fn resume_recording(shared: Arc<Shared>, generation: Generation) -> Result<()> {
    match shared.files.has_available_space().await {
        Ok(true) => {
            if let Err(e) = shared.engine.resume() {
                debug!("Resume failed: {}", e);
            }
        }
        Ok(false) => shared.report(generation, SessionError::StorageExhausted.into()),
        Err(e) => shared.report(generation, Failure::new(ErrorCode::StorageAccess, format!("{:#}", e))),
    }
    Ok(())
}

pub(super) fn handle_recorder_event(
    shared: &Arc<Shared>,
    state: &mut SessionState,
    generation: Generation,
    event: RecorderEvent,
) {
    match event {
        RecorderEvent::Started { path } => {
            state.recording_amplitudes.clear();
            state.last_info_refresh = None;

            shared.notify(generation, SessionEvent::RecordingStarted { path: path.clone() });
            if shared.settings.keep_screen_on() {
                shared.notify(generation, SessionEvent::KeepScreenOn { enabled: true });
            }
            refresh_information(shared, state, generation, path);
        }
        RecorderEvent::Paused { duration_ms } => {
            shared.notify(generation, SessionEvent::RecordingPaused { duration_ms });

            if std::mem::take(&mut state.discard_pending) {
                shared.notify(generation, SessionEvent::ConfirmDiscard);
            }
        }
        RecorderEvent::Resumed => {
            shared.notify(generation, SessionEvent::RecordingResumed);
        }
        RecorderEvent::Progress {
            duration_ms,
            amplitude,
        } => {
            state.recording_amplitudes.push(amplitude);
            shared.notify(
                generation,
                SessionEvent::RecordingProgress {
                    duration_ms,
                    amplitude,
                },
            );

            if let Some(path) = shared.engine.output_path() {
                refresh_information(shared, state, generation, path);
            }
        }
        RecorderEvent::Stopped { path, duration_ms } => {
            state.discard_pending = false;
            let delete = std::mem::take(&mut state.delete_on_stop);
            let amplitudes = std::mem::take(&mut state.recording_amplitudes);

            shared.notify(generation, SessionEvent::KeepScreenOn { enabled: false });
            shared.notify(generation, SessionEvent::RecordingStopped);

            if path.as_os_str().is_empty() {
                return;
            }
            if !delete {
                shared.notify(generation, SessionEvent::ProgressShown);
            }
            enqueue(
                &shared.queues.recordings,
                persist_recording(
                    Arc::clone(shared),
                    generation,
                    path,
                    duration_ms,
                    amplitudes,
                    delete,
                ),
            );
        }
        RecorderEvent::Error(err) => {
            state.discard_pending = false;
            shared.notify(generation, SessionEvent::KeepScreenOn { enabled: false });
            shared.notify(generation, SessionEvent::error(err.code(), err.to_string()));
        }
    }
}

/// Refresh size / format / sample rate, at most once per refresh interval
fn refresh_information(
    shared: &Arc<Shared>,
    state: &mut SessionState,
    generation: Generation,
    path: PathBuf,
) {
    let now = Instant::now();
    if let Some(last) = state.last_info_refresh {
        if now.saturating_duration_since(last) < shared.config.info_refresh_interval {
            return;
        }
    }
    state.last_info_refresh = Some(now);

    enqueue(
        &shared.queues.loading,
        read_recording_size(Arc::clone(shared), generation, path),
    );
}

async fn read_recording_size(shared: Arc<Shared>, generation: Generation, path: PathBuf) -> Result<()> {
    let size = shared.files.file_size(&path).await?;
    let settings = shared.settings.snapshot();
    let line = information_line(size, &settings.format, settings.sample_rate);

    shared.post(move |shared, _| shared.notify(generation, SessionEvent::Information { line }));
    Ok(())
}

/// Turn a stopped capture into a record, or drop it when discarded
async fn persist_recording(
    shared: Arc<Shared>,
    generation: Generation,
    path: PathBuf,
    duration_ms: u64,
    amplitudes: Vec<i32>,
    delete: bool,
) -> Result<()> {
    if delete {
        info!("Discarding recording {}", path.display());
        shared.files.delete_file(&path).await?;
        return Ok(());
    }

    let info = match shared.decoder.read_info(&path).await {
        Ok(info) => info,
        Err(e) => {
            warn!(
                "Could not read {}, using capture settings: {:#}",
                path.display(),
                e
            );
            let settings = shared.settings.snapshot();
            RecordInfo {
                duration_ms,
                size: shared.files.file_size(&path).await.unwrap_or(0),
                sample_rate: settings.sample_rate,
                channel_count: settings.channel_count,
                bitrate: settings.bitrate,
                format: settings.format,
            }
        }
    };

    let mut record = Record::new_unsaved(&path, &info, shared.config.waveform_samples);
    if record.duration_ms == 0 {
        record.duration_ms = duration_ms;
    }
    waveform::fit_into(&mut record.amplitudes, &amplitudes);

    let record = match shared.records.insert(record).await {
        Ok(record) => record,
        Err(e) => {
            error!("Failed to save recording {}: {:#}", path.display(), e);
            let error = SessionError::classify(&e, SessionError::PersistenceFailure);
            shared.report(generation, error.into());
            shared.post(move |shared, _| shared.notify(generation, SessionEvent::ProgressHidden));
            return Ok(());
        }
    };

    if let Err(e) = shared.settings.set_active_record(record.id) {
        warn!("Failed to remember active record: {:#}", e);
    }
    shared.publish(CommitKind::Inserted, &record);
    info!("Recording saved as record {} ({})", record.id, record.name);

    let ask_to_rename = shared.settings.ask_to_rename().unwrap_or(true);
    let id = record.id;
    shared.post(move |shared, state| {
        shared.notify_loaded(generation, &record);
        if ask_to_rename {
            shared.notify(
                generation,
                SessionEvent::AskRename {
                    id: record.id,
                    name: record.name.clone(),
                },
            );
        }
        shared.notify(generation, SessionEvent::ProgressHidden);
        state.active = Some(record);
    });

    schedule_decode(&shared, id, generation);
    Ok(())
}
