use serde::{Deserialize, Serialize};

use crate::session::{CommitKind, RecordCommitted};

/// Record commit published to NATS
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordCommitMessage {
    pub session_id: String,
    pub record_id: i64,
    pub kind: CommitKind,
    pub name: String,
    pub path: String,
    pub duration_ms: u64,
    pub timestamp: String, // RFC3339 timestamp
}

impl RecordCommitMessage {
    pub fn new(session_id: &str, commit: &RecordCommitted) -> Self {
        Self {
            session_id: session_id.to_string(),
            record_id: commit.record_id,
            kind: commit.kind,
            name: commit.name.clone(),
            path: commit.path.display().to_string(),
            duration_ms: commit.duration_ms,
            timestamp: commit.committed_at.to_rfc3339(),
        }
    }
}
