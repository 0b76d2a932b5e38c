use anyhow::{Context, Result};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::commit::CommitKind;
use super::observer::{Generation, SessionEvent};
use super::orchestrator::{enqueue, SessionOrchestrator, Shared, METADATA_MIGRATION_VERSION};
use crate::record::RecordId;

impl SessionOrchestrator {
    /// Tell the observer about the first run until it is acknowledged
    pub fn check_first_run(&self) {
        let generation = self.shared.binding.current();
        self.shared.post(move |shared, _| {
            if shared.settings.is_first_run() {
                shared.notify(generation, SessionEvent::FirstRun);
            }
        });
    }

    pub fn acknowledge_first_run(&self) {
        if let Err(e) = self.shared.settings.set_first_run_done() {
            warn!("Failed to store first run flag: {:#}", e);
        }
    }

    /// Warn when records still live under `dir`, at most once per cooldown
    pub fn check_legacy_storage(&self, dir: impl Into<PathBuf>) {
        let generation = self.shared.binding.current();
        enqueue(
            &self.shared.queues.loading,
            run_legacy_check(Arc::clone(&self.shared), generation, dir.into()),
        );
    }

    pub fn set_ask_to_rename(&self, ask: bool) {
        if let Err(e) = self.shared.settings.set_ask_to_rename(ask) {
            warn!("Failed to store rename preference: {:#}", e);
        }
    }
}

async fn run_legacy_check(shared: Arc<Shared>, generation: Generation, dir: PathBuf) -> Result<()> {
    let now = Utc::now().timestamp_millis();
    let cooldown = shared.config.legacy_check_cooldown.as_millis() as i64;

    if let Some(last) = shared.settings.last_legacy_check() {
        if now - last < cooldown {
            debug!("Legacy storage checked recently, skipping");
            return Ok(());
        }
    }

    let found = shared
        .records
        .has_any_path_under(&dir)
        .await
        .context("Failed to scan records for legacy paths")?;

    // Only a shown warning starts the cooldown
    if found {
        warn!("Records found in legacy storage {}", dir.display());
        shared.settings.set_last_legacy_check(now)?;
        shared.post(move |shared, _| {
            shared.notify(generation, SessionEvent::LegacyStorageFound { dir })
        });
    }
    Ok(())
}

pub(super) fn schedule_rename_default(shared: &Arc<Shared>) {
    enqueue(&shared.queues.loading, default_rename_preference(Arc::clone(shared)));
}

/// Ask to rename new recordings unless the user already chose
async fn default_rename_preference(shared: Arc<Shared>) -> Result<()> {
    if shared.settings.ask_to_rename().is_none() {
        shared
            .settings
            .set_ask_to_rename(true)
            .context("Failed to store rename preference")?;
    }
    Ok(())
}

pub(super) fn schedule_migration(shared: &Arc<Shared>) {
    enqueue(&shared.queues.processing, migrate_metadata(Arc::clone(shared)));
}

/// Re-read the file info of every active and trashed record
///
/// A missing or unreadable file skips that record only.
async fn migrate_metadata(shared: Arc<Shared>) -> Result<()> {
    info!("Migrating record metadata to version {}", METADATA_MIGRATION_VERSION);

    let mut ids = shared
        .records
        .active_ids()
        .await
        .context("Failed to list active records")?;
    ids.extend(
        shared
            .records
            .trash_ids()
            .await
            .context("Failed to list trashed records")?,
    );

    let mut migrated = 0;
    let mut failed = 0;
    for id in ids {
        match migrate_record(&shared, id).await {
            Ok(true) => migrated += 1,
            Ok(false) => {}
            Err(e) => {
                failed += 1;
                warn!("Skipping record {} during migration: {:#}", id, e);
            }
        }
    }

    shared.settings.set_migration_version(METADATA_MIGRATION_VERSION)?;
    info!(
        "Metadata migration finished: {} updated, {} failed",
        migrated, failed
    );
    Ok(())
}

async fn migrate_record(shared: &Shared, id: RecordId) -> Result<bool> {
    let Some(mut record) = shared.records.get(id).await? else {
        return Ok(false);
    };

    let info = shared.decoder.read_info(&record.path).await?;
    record.apply_info(&info);
    if info.duration_ms > 0 {
        record.duration_ms = info.duration_ms;
    }

    let updated = shared.records.update(&record).await?;
    if updated {
        shared.publish(CommitKind::Updated, &record);
    }
    Ok(updated)
}
