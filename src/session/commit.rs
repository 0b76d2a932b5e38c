use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::record::{Record, RecordId};

/// What happened to a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitKind {
    Inserted,
    Updated,
    Trashed,
    Deleted,
}

/// Published after a record mutation is durable
///
/// Downstream consumers are fire-and-forget; nothing waits for them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordCommitted {
    pub record_id: RecordId,
    pub kind: CommitKind,
    pub name: String,
    pub path: PathBuf,
    pub duration_ms: u64,
    pub committed_at: DateTime<Utc>,
}

impl RecordCommitted {
    pub fn new(kind: CommitKind, record: &Record) -> Self {
        Self {
            record_id: record.id,
            kind,
            name: record.name.clone(),
            path: record.path.clone(),
            duration_ms: record.duration_ms,
            committed_at: Utc::now(),
        }
    }
}
