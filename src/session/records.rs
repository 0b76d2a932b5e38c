use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::commit::CommitKind;
use super::observer::{Generation, SessionEvent};
use super::orchestrator::{enqueue, Failure, SessionOrchestrator, Shared};
use crate::audio::waveform;
use crate::error::{ErrorCode, SessionError};
use crate::playback::PlayerState;
use crate::record::{display_name, sanitize_name, Record, RecordId, NO_ID};

/// Attempts at putting the old file name back after a failed rename
const RESTORE_ATTEMPTS: u32 = 3;

impl SessionOrchestrator {
    /// Show the record whose id is persisted in settings
    pub fn load_active_record(&self) {
        schedule_load(&self.shared, self.shared.binding.current());
    }

    /// Replace the placeholder waveform of `id` with decoded peaks
    pub fn decode_record(&self, id: RecordId) {
        schedule_decode(&self.shared, id, self.shared.binding.current());
    }

    pub fn rename_record(&self, id: RecordId, new_name: &str) {
        let generation = self.shared.binding.current();
        let name = sanitize_name(new_name);

        if id < 0 || name.is_empty() {
            self.shared.report(
                generation,
                Failure::new(ErrorCode::RenameFailed, "record name must not be empty"),
            );
            return;
        }

        self.shared
            .post(move |shared, _| shared.notify(generation, SessionEvent::ProgressShown));
        enqueue(
            &self.shared.queues.recordings,
            run_rename(Arc::clone(&self.shared), generation, id, name),
        );
    }

    /// Move `id` to the trash, or erase it with `forever`
    pub fn delete_record(&self, id: RecordId, forever: bool) {
        let generation = self.shared.binding.current();
        enqueue(
            &self.shared.queues.recordings,
            run_delete(Arc::clone(&self.shared), generation, id, forever),
        );
    }

    pub fn delete_active_record(&self, forever: bool) {
        let generation = self.shared.binding.current();
        self.shared.post(move |shared, state| match state.active.as_ref() {
            Some(record) => enqueue(
                &shared.queues.recordings,
                run_delete(Arc::clone(shared), generation, record.id, forever),
            ),
            None => debug!("No active record to delete"),
        });
    }

    /// Send the active record's full metadata to the observer
    pub fn show_record_info(&self) {
        let generation = self.shared.binding.current();
        self.shared.post(move |shared, state| {
            if let Some(record) = &state.active {
                shared.notify(
                    generation,
                    SessionEvent::RecordInfo {
                        record: record.clone(),
                    },
                );
            }
        });
    }
}

pub(super) fn schedule_load(shared: &Arc<Shared>, generation: Generation) {
    enqueue(
        &shared.queues.loading,
        run_load(Arc::clone(shared), generation),
    );
}

pub(super) fn schedule_decode(shared: &Arc<Shared>, id: RecordId, generation: Generation) {
    enqueue(
        &shared.queues.processing,
        run_decode(Arc::clone(shared), generation, id),
    );
}

async fn run_load(shared: Arc<Shared>, generation: Generation) -> Result<()> {
    let id = shared.settings.active_record();
    let record = if id == NO_ID {
        None
    } else {
        match shared.records.get(id).await {
            Ok(record) => record.filter(|r| !r.is_trashed()),
            Err(e) => {
                shared.report(generation, Failure::new(ErrorCode::StorageAccess, format!("{:#}", e)));
                return Ok(());
            }
        }
    };

    let Some(record) = record else {
        if id != NO_ID {
            debug!("Active record {} is gone", id);
            shared.settings.set_active_record(NO_ID)?;
        }
        shared.post(move |shared, state| {
            state.active = None;
            shared.notify(generation, SessionEvent::RecordCleared);
        });
        return Ok(());
    };

    let needs_decode = !record.waveform_processed;
    shared.post(move |shared, state| {
        shared.notify_loaded(generation, &record);
        if shared.player.state() == PlayerState::Paused
            && shared.player.current_path().as_deref() == Some(record.path.as_path())
        {
            shared.notify(
                generation,
                SessionEvent::PlaybackPaused {
                    position_ms: shared.player.position_ms(),
                },
            );
        }
        state.active = Some(record);
    });

    if needs_decode {
        schedule_decode(&shared, id, generation);
    }
    Ok(())
}

async fn run_decode(shared: Arc<Shared>, generation: Generation, id: RecordId) -> Result<()> {
    let Some(record) = shared.records.get(id).await.context("Failed to read record")? else {
        debug!("Record {} is gone, nothing to decode", id);
        return Ok(());
    };
    if record.waveform_processed {
        return Ok(());
    }

    let limit = shared.config.decode_duration_limit.as_millis() as u64;
    if record.duration_ms >= limit {
        info!(
            "Record {} is too long for waveform decoding ({}ms)",
            id, record.duration_ms
        );
        return Ok(());
    }

    let samples = if record.amplitudes.is_empty() {
        shared.config.waveform_samples
    } else {
        record.amplitudes.len()
    };

    let peaks = match shared.decoder.decode_waveform(&record.path, samples).await {
        Ok(peaks) => peaks,
        Err(e) => {
            let error = SessionError::classify(&e, SessionError::UnreadableSource);
            shared.report(generation, error.into());
            return Ok(());
        }
    };

    // Rename or delete may have landed on the recordings queue meanwhile
    let Some(mut current) = shared.records.get(id).await.context("Failed to re-read record")? else {
        return Ok(());
    };
    if current.amplitudes.is_empty() {
        current.amplitudes = vec![0; samples];
    }
    waveform::fit_into(&mut current.amplitudes, &peaks);
    current.waveform_processed = true;

    if !shared.records.update(&current).await.context("Failed to store waveform")? {
        return Ok(());
    }
    shared.publish(CommitKind::Updated, &current);
    debug!("Waveform of record {} processed", id);

    shared.post(move |shared, state| {
        if state.active.as_ref().is_some_and(|a| a.id == id) {
            shared.notify(
                generation,
                SessionEvent::RecordLoaded {
                    record: current.clone(),
                },
            );
            state.active = Some(current);
        }
    });
    Ok(())
}

async fn run_rename(
    shared: Arc<Shared>,
    generation: Generation,
    id: RecordId,
    name: String,
) -> Result<()> {
    let outcome = rename_in_storage(&shared, id, &name).await;

    shared.post(move |shared, state| {
        match outcome {
            Ok(record) => {
                if state.active.as_ref().is_some_and(|a| a.id == id) {
                    shared.notify_loaded(generation, &record);
                    state.active = Some(record.clone());
                }
                shared.notify(
                    generation,
                    SessionEvent::RecordRenamed {
                        id,
                        name: record.name,
                    },
                );
            }
            Err(failure) => {
                warn!("Rename of record {} failed: {}", id, failure.message);
                shared.notify(generation, failure.into_event());
            }
        }
        shared.notify(generation, SessionEvent::ProgressHidden);
    });
    Ok(())
}

async fn rename_in_storage(shared: &Shared, id: RecordId, name: &str) -> Result<Record, Failure> {
    let record = shared
        .records
        .get(id)
        .await
        .map_err(|e| Failure::new(ErrorCode::RenameFailed, format!("{:#}", e)))?
        .ok_or_else(|| Failure::new(ErrorCode::RenameFailed, format!("record {} not found", id)))?;

    let ext = record.extension();
    let target = if ext.is_empty() {
        record.path.with_file_name(name)
    } else {
        record.path.with_file_name(format!("{}.{}", name, ext))
    };
    if target == record.path {
        return Ok(record);
    }
    if shared.files.exists(&target).await {
        return Err(SessionError::NameConflict(target.display().to_string()).into());
    }

    let renamed = shared
        .files
        .rename(&record.path, name, &ext)
        .await
        .map_err(|e| match SessionError::classify(&e, SessionError::PersistenceFailure) {
            conflict @ SessionError::NameConflict(_) => Failure::from(conflict),
            other => Failure::new(ErrorCode::RenameFailed, other.to_string()),
        })?;

    let mut updated = record.clone();
    updated.name = name.to_string();
    updated.path = renamed.clone();

    match shared.records.update(&updated).await {
        Ok(true) => {
            shared.publish(CommitKind::Updated, &updated);
            info!("Record {} renamed to {}", id, name);
            Ok(updated)
        }
        outcome => {
            match outcome {
                Ok(_) => error!("Record {} disappeared during rename", id),
                Err(e) => error!("Failed to persist rename of record {}: {:#}", id, e),
            }
            restore_file_name(shared, &renamed, &record).await;
            Err(Failure::new(
                ErrorCode::RenameFailed,
                format!("could not rename record {}", id),
            ))
        }
    }
}

async fn restore_file_name(shared: &Shared, renamed: &Path, original: &Record) {
    let name = display_name(&original.path);
    let ext = original.extension();

    for attempt in 1..=RESTORE_ATTEMPTS {
        match shared.files.rename(renamed, &name, &ext).await {
            Ok(_) => {
                info!("Restored file name {}", original.path.display());
                return;
            }
            Err(e) => warn!(
                "Restoring {} failed (attempt {}/{}): {:#}",
                original.path.display(),
                attempt,
                RESTORE_ATTEMPTS,
                e
            ),
        }
    }
    error!("Giving up restoring {}", original.path.display());
}

async fn run_delete(
    shared: Arc<Shared>,
    generation: Generation,
    id: RecordId,
    forever: bool,
) -> Result<()> {
    let record = match shared.records.get(id).await {
        Ok(Some(record)) => record,
        Ok(None) => {
            debug!("Record {} does not exist, nothing to delete", id);
            return Ok(());
        }
        Err(e) => {
            shared.report(generation, Failure::new(ErrorCode::StorageAccess, format!("{:#}", e)));
            return Ok(());
        }
    };

    let result = if forever {
        if let Err(e) = shared.files.delete_file(&record.path).await {
            warn!("Failed to delete file of record {}: {:#}", id, e);
        }
        shared.records.hard_delete(id).await
    } else {
        shared.records.soft_delete(id).await
    };

    if let Err(e) = result {
        let error = SessionError::classify(&e, SessionError::PersistenceFailure);
        shared.report(generation, error.into());
        return Ok(());
    }

    shared.publish(
        if forever {
            CommitKind::Deleted
        } else {
            CommitKind::Trashed
        },
        &record,
    );
    if shared.settings.active_record() == id {
        shared.settings.set_active_record(NO_ID)?;
    }
    info!(
        "Record {} {}",
        id,
        if forever { "deleted" } else { "moved to trash" }
    );

    shared.post(move |shared, state| {
        if state.active.as_ref().is_some_and(|a| a.id == id) {
            state.active = None;
            if shared.player.current_path().as_deref() == Some(record.path.as_path()) {
                shared.player.stop();
            }
            shared.notify(generation, SessionEvent::RecordCleared);
        }
        shared.notify(generation, SessionEvent::RecordDeleted { id, forever });
    });
    Ok(())
}
