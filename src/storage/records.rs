use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use super::RecordStore;
use crate::record::{Record, RecordId, NOT_REMOVED};

#[derive(Debug, Default, Serialize, Deserialize)]
struct RecordTable {
    next_id: RecordId,
    records: BTreeMap<RecordId, Record>,
}

/// [`RecordStore`] persisted as a single JSON document
///
/// Every mutation rewrites the document through a temporary file.
pub struct JsonRecordStore {
    path: Option<PathBuf>,
    table: Mutex<RecordTable>,
    lost: broadcast::Sender<Vec<Record>>,
}

impl JsonRecordStore {
    /// Open (or create) the store at `path`
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let table = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("Corrupt record database {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => RecordTable::default(),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()))
            }
        };

        info!(
            "Record store opened: {} ({} records)",
            path.display(),
            table.records.len()
        );

        Ok(Self::with_table(Some(path), table))
    }

    /// Store that never touches the disk
    pub fn in_memory() -> Self {
        Self::with_table(None, RecordTable::default())
    }

    fn with_table(path: Option<PathBuf>, table: RecordTable) -> Self {
        let (lost, _) = broadcast::channel(16);
        Self {
            path,
            table: Mutex::new(table),
            lost,
        }
    }

    async fn persist(&self, table: &RecordTable) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let json = serde_json::to_vec_pretty(table).context("Failed to serialize records")?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, path)
            .await
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }

    async fn report_lost(&self, records: Vec<&Record>) {
        let mut lost = Vec::new();
        for record in records {
            if tokio::fs::metadata(&record.path).await.is_err() {
                lost.push(record.clone());
            }
        }
        if !lost.is_empty() {
            warn!("{} records lost their files", lost.len());
            let _ = self.lost.send(lost);
        }
    }
}

#[async_trait]
impl RecordStore for JsonRecordStore {
    async fn insert(&self, mut record: Record) -> Result<Record> {
        let mut table = self.table.lock().await;
        table.next_id += 1;
        record.id = table.next_id;
        table.records.insert(record.id, record.clone());

        if let Err(e) = self.persist(&table).await {
            table.records.remove(&record.id);
            return Err(e);
        }

        debug!("Inserted record {} ({})", record.id, record.name);
        Ok(record)
    }

    async fn update(&self, record: &Record) -> Result<bool> {
        let mut table = self.table.lock().await;
        let Some(slot) = table.records.get_mut(&record.id) else {
            return Ok(false);
        };
        let previous = std::mem::replace(slot, record.clone());

        if let Err(e) = self.persist(&table).await {
            table.records.insert(record.id, previous);
            return Err(e);
        }
        Ok(true)
    }

    async fn get(&self, id: RecordId) -> Result<Option<Record>> {
        Ok(self.table.lock().await.records.get(&id).cloned())
    }

    async fn soft_delete(&self, id: RecordId) -> Result<bool> {
        let mut table = self.table.lock().await;
        let Some(record) = table.records.get_mut(&id) else {
            return Ok(false);
        };
        let previous = record.removed;
        record.removed = Utc::now().timestamp_millis();

        if let Err(e) = self.persist(&table).await {
            if let Some(record) = table.records.get_mut(&id) {
                record.removed = previous;
            }
            return Err(e);
        }
        Ok(true)
    }

    async fn hard_delete(&self, id: RecordId) -> Result<bool> {
        let mut table = self.table.lock().await;
        let Some(removed) = table.records.remove(&id) else {
            return Ok(false);
        };

        if let Err(e) = self.persist(&table).await {
            table.records.insert(id, removed);
            return Err(e);
        }
        Ok(true)
    }

    async fn active_ids(&self) -> Result<Vec<RecordId>> {
        let table = self.table.lock().await;
        let active: Vec<&Record> = table
            .records
            .values()
            .filter(|r| r.removed == NOT_REMOVED)
            .collect();
        let ids = active.iter().map(|r| r.id).collect();
        self.report_lost(active).await;
        Ok(ids)
    }

    async fn trash_ids(&self) -> Result<Vec<RecordId>> {
        let table = self.table.lock().await;
        Ok(table
            .records
            .values()
            .filter(|r| r.is_trashed())
            .map(|r| r.id)
            .collect())
    }

    async fn has_any_path_under(&self, dir: &Path) -> Result<bool> {
        let table = self.table.lock().await;
        Ok(table.records.values().any(|r| r.path.starts_with(dir)))
    }

    fn subscribe_lost(&self) -> broadcast::Receiver<Vec<Record>> {
        self.lost.subscribe()
    }
}
