//! Storage collaborators
//!
//! The orchestrator only talks to these traits. All of them except
//! [`SettingsStore`] touch the disk and are called from queue items.

mod files;
mod records;
mod settings;

use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::broadcast;

use crate::record::{Record, RecordId};

pub use files::LocalFileStore;
pub use records::JsonRecordStore;
pub use settings::{JsonSettings, Settings};

/// Persistent records with trash semantics
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert `record`, returning it with the id assigned by the store
    async fn insert(&self, record: Record) -> Result<Record>;

    /// Overwrite the row with `record.id`. `false` when no such row exists.
    async fn update(&self, record: &Record) -> Result<bool>;

    async fn get(&self, id: RecordId) -> Result<Option<Record>>;

    /// Move a record to the trash. `false` when the id is unknown.
    async fn soft_delete(&self, id: RecordId) -> Result<bool>;

    /// Remove the row. `false` when the id is unknown.
    async fn hard_delete(&self, id: RecordId) -> Result<bool>;

    async fn active_ids(&self) -> Result<Vec<RecordId>>;

    async fn trash_ids(&self) -> Result<Vec<RecordId>>;

    /// Whether any record (active or trashed) has its file under `dir`
    async fn has_any_path_under(&self, dir: &Path) -> Result<bool>;

    /// Active records whose files disappeared, reported as they are found
    fn subscribe_lost(&self) -> broadcast::Receiver<Vec<Record>>;
}

/// File operations inside the managed recordings directory
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Create an empty file named `name.ext`, made unique if taken
    async fn provide_output_file(&self, name: &str, ext: &str) -> Result<PathBuf>;

    async fn copy_into(&self, source: &Path, dest: &Path) -> Result<()>;

    /// Rename `path` to `new_name.ext` in the same directory
    async fn rename(&self, path: &Path, new_name: &str, ext: &str) -> Result<PathBuf>;

    async fn delete_file(&self, path: &Path) -> Result<()>;

    async fn exists(&self, path: &Path) -> bool;

    async fn file_size(&self, path: &Path) -> Result<u64>;

    async fn has_available_space(&self) -> Result<bool>;

    fn recordings_dir(&self) -> &Path;
}

/// Small synchronous preference store
///
/// Implementors provide `snapshot` and `update`; field accessors are
/// derived from those.
pub trait SettingsStore: Send + Sync {
    fn snapshot(&self) -> Settings;

    fn update(&self, apply: &mut dyn FnMut(&mut Settings)) -> Result<()>;

    fn active_record(&self) -> RecordId {
        self.snapshot().active_record
    }

    fn set_active_record(&self, id: RecordId) -> Result<()> {
        self.update(&mut |s| s.active_record = id)
    }

    fn is_first_run(&self) -> bool {
        self.snapshot().first_run
    }

    fn set_first_run_done(&self) -> Result<()> {
        self.update(&mut |s| s.first_run = false)
    }

    fn migration_version(&self) -> u32 {
        self.snapshot().migration_version
    }

    fn set_migration_version(&self, version: u32) -> Result<()> {
        self.update(&mut |s| s.migration_version = version)
    }

    fn keep_screen_on(&self) -> bool {
        self.snapshot().keep_screen_on
    }

    fn ask_to_rename(&self) -> Option<bool> {
        self.snapshot().ask_to_rename
    }

    fn set_ask_to_rename(&self, ask: bool) -> Result<()> {
        self.update(&mut |s| s.ask_to_rename = Some(ask))
    }

    fn last_legacy_check(&self) -> Option<i64> {
        self.snapshot().last_legacy_check
    }

    fn set_last_legacy_check(&self, at_ms: i64) -> Result<()> {
        self.update(&mut |s| s.last_legacy_check = Some(at_ms))
    }
}
