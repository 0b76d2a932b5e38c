use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Identifier assigned by the record store on insert
pub type RecordId = i64;

/// Id of a record that has not been inserted yet
pub const NO_ID: RecordId = -1;

/// `removed` value of a record that is not in the trash
pub const NOT_REMOVED: i64 = i64::MAX;

/// Persisted metadata of a recorded or imported audio file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,

    /// Display name (file name without extension)
    pub name: String,

    pub duration_ms: u64,

    /// Unix timestamps in milliseconds
    pub created: i64,
    pub added: i64,
    pub removed: i64,

    /// Absolute path of the audio file
    pub path: PathBuf,

    /// Container format tag ("wav", "m4a", ...)
    pub format: String,

    pub size: u64,
    pub sample_rate: u32,
    pub channel_count: u16,
    pub bitrate: u32,

    pub bookmarked: bool,

    /// Whether `amplitudes` hold decoded peaks rather than placeholder zeros
    pub waveform_processed: bool,

    /// Fixed-length waveform, allocated when the record is created
    pub amplitudes: Vec<i32>,
}

impl Record {
    /// Build a record that has not been inserted yet.
    ///
    /// The waveform is zero-filled to `waveform_len` and marked unprocessed.
    pub fn new_unsaved(path: impl Into<PathBuf>, info: &RecordInfo, waveform_len: usize) -> Self {
        let path = path.into();
        let now = Utc::now().timestamp_millis();

        Self {
            id: NO_ID,
            name: display_name(&path),
            duration_ms: info.duration_ms,
            created: now,
            added: now,
            removed: NOT_REMOVED,
            path,
            format: info.format.clone(),
            size: info.size,
            sample_rate: info.sample_rate,
            channel_count: info.channel_count,
            bitrate: info.bitrate,
            bookmarked: false,
            waveform_processed: false,
            amplitudes: vec![0; waveform_len],
        }
    }

    pub fn is_trashed(&self) -> bool {
        self.removed != NOT_REMOVED
    }

    /// Copy the technical fields of `info` over this record
    pub fn apply_info(&mut self, info: &RecordInfo) {
        self.format = info.format.clone();
        self.size = info.size;
        self.sample_rate = info.sample_rate;
        self.channel_count = info.channel_count;
        self.bitrate = info.bitrate;
    }

    /// Extension of the backing file, falling back to the format tag
    pub fn extension(&self) -> String {
        self.path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_string)
            .unwrap_or_else(|| self.format.clone())
    }
}

/// Technical information read from an audio file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordInfo {
    pub duration_ms: u64,
    pub size: u64,
    pub sample_rate: u32,
    pub channel_count: u16,
    pub bitrate: u32,
    pub format: String,
}

/// File name without its extension
pub fn display_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Strip characters that are not allowed in file names
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0'))
        .collect::<String>()
        .trim()
        .to_string()
}
