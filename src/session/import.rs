use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use super::commit::CommitKind;
use super::observer::{Generation, ImportStage, SessionEvent};
use super::orchestrator::{enqueue, Failure, SessionOrchestrator, Shared};
use super::records::schedule_decode;
use crate::error::SessionError;
use crate::playback::PlayerState;
use crate::record::{display_name, Record};

impl SessionOrchestrator {
    /// Copy an external audio file into managed storage and make it active
    ///
    /// The record appears with a placeholder waveform as soon as it is
    /// saved; the waveform is decoded afterwards on the processing queue.
    pub fn import_file(&self, source: impl Into<PathBuf>) {
        let source = source.into();
        let generation = self.shared.binding.current();
        let name = display_name(&source);

        self.shared.post(move |shared, state| {
            state.import_in_progress = true;
            shared.notify(generation, SessionEvent::ImportStarted { name });
        });
        enqueue(
            &self.shared.queues.import,
            run_import(Arc::clone(&self.shared), generation, source),
        );
    }
}

async fn run_import(shared: Arc<Shared>, generation: Generation, source: PathBuf) -> Result<()> {
    match import_into_storage(&shared, generation, &source).await {
        Ok(record) => {
            info!("Imported {} as record {}", source.display(), record.id);
            let id = record.id;
            shared.post(move |shared, state| {
                if shared.player.state() != PlayerState::Stopped {
                    shared.player.stop();
                }
                shared.notify_loaded(generation, &record);
                state.active = Some(record);
            });
            schedule_decode(&shared, id, generation);
        }
        Err(failure) => {
            warn!("Import of {} failed", source.display());
            shared.report(generation, failure);
        }
    }

    shared.post(move |shared, state| {
        state.import_in_progress = false;
        shared.notify(generation, SessionEvent::ImportFinished);
    });
    Ok(())
}

fn unreadable(e: anyhow::Error) -> Failure {
    SessionError::classify(&e, SessionError::UnreadableSource).into()
}

fn stage(shared: &Arc<Shared>, generation: Generation, stage: ImportStage) {
    shared.post(move |shared, _| shared.notify(generation, SessionEvent::ImportProgress { stage }));
}

async fn import_into_storage(
    shared: &Arc<Shared>,
    generation: Generation,
    source: &Path,
) -> Result<Record, Failure> {
    if !shared.files.has_available_space().await.map_err(unreadable)? {
        return Err(SessionError::StorageExhausted.into());
    }

    stage(shared, generation, ImportStage::Copying);
    let name = display_name(source);
    let ext = source
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_else(|| "wav".to_string());

    let dest = shared
        .files
        .provide_output_file(&name, &ext)
        .await
        .map_err(unreadable)?;
    if let Err(e) = shared.files.copy_into(source, &dest).await {
        discard(shared, &dest).await;
        return Err(unreadable(e));
    }

    stage(shared, generation, ImportStage::ReadingInfo);
    let info = match shared.decoder.read_info(&dest).await {
        Ok(info) => info,
        Err(e) => {
            discard(shared, &dest).await;
            return Err(unreadable(e));
        }
    };

    stage(shared, generation, ImportStage::Saving);
    let record = Record::new_unsaved(&dest, &info, shared.config.waveform_samples);
    let record = match shared.records.insert(record).await {
        Ok(record) => record,
        Err(e) => {
            discard(shared, &dest).await;
            return Err(SessionError::classify(&e, SessionError::PersistenceFailure).into());
        }
    };

    if let Err(e) = shared.settings.set_active_record(record.id) {
        warn!("Failed to remember active record: {:#}", e);
    }
    shared.publish(CommitKind::Inserted, &record);
    Ok(record)
}

async fn discard(shared: &Shared, dest: &Path) {
    if let Err(e) = shared.files.delete_file(dest).await {
        warn!("Failed to clean up {}: {:#}", dest.display(), e);
    }
}
