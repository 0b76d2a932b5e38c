use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

use super::SettingsStore;
use crate::record::{RecordId, NO_ID};

/// Persisted preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub active_record: RecordId,
    pub format: String,
    pub sample_rate: u32,
    pub channel_count: u16,
    pub bitrate: u32,
    pub first_run: bool,
    pub migration_version: u32,
    pub keep_screen_on: bool,
    /// `None` until the first observer attaches
    pub ask_to_rename: Option<bool>,
    /// Unix ms of the last legacy storage check
    pub last_legacy_check: Option<i64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            active_record: NO_ID,
            format: "wav".to_string(),
            sample_rate: 44100,
            channel_count: 1,
            bitrate: 128_000,
            first_run: true,
            migration_version: 0,
            keep_screen_on: false,
            ask_to_rename: None,
            last_legacy_check: None,
        }
    }
}

/// [`SettingsStore`] persisted as a JSON file
pub struct JsonSettings {
    path: Option<PathBuf>,
    settings: Mutex<Settings>,
}

impl JsonSettings {
    /// Load settings from `path`, falling back to defaults for a missing or
    /// unparsable file
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let settings = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!("Ignoring unparsable settings {}: {}", path.display(), e);
                Settings::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Settings::default(),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()))
            }
        };

        Ok(Self {
            path: Some(path),
            settings: Mutex::new(settings),
        })
    }

    pub fn in_memory(settings: Settings) -> Self {
        Self {
            path: None,
            settings: Mutex::new(settings),
        }
    }
}

impl SettingsStore for JsonSettings {
    fn snapshot(&self) -> Settings {
        self.settings.lock().clone()
    }

    fn update(&self, apply: &mut dyn FnMut(&mut Settings)) -> Result<()> {
        let mut settings = self.settings.lock();
        apply(&mut settings);

        if let Some(path) = &self.path {
            let json = serde_json::to_vec_pretty(&*settings).context("Failed to serialize settings")?;
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
        Ok(())
    }
}
