use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::recorder::EngineConfig;
use crate::session::SessionConfig;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub recording: RecordingConfig,
    #[serde(default)]
    pub waveform: WaveformConfig,
    #[serde(default)]
    pub nats: NatsConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    pub recordings_path: String,
    pub records_db: String,
    pub settings_file: String,
    /// Byte budget of the recordings directory; unlimited when absent
    pub quota_bytes: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub format: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub bitrate: u32,
    pub progress_interval_ms: u64,
    pub info_refresh_ms: u64,
    pub supports_pause: bool,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            format: "wav".to_string(),
            sample_rate: 44100,
            channels: 1,
            bitrate: 128_000,
            progress_interval_ms: 100,
            info_refresh_ms: 3000,
            supports_pause: true,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WaveformConfig {
    pub samples: usize,
    pub decode_limit_secs: u64,
}

impl Default for WaveformConfig {
    fn default() -> Self {
        Self {
            samples: 600,
            decode_limit_secs: 60 * 60,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct NatsConfig {
    pub enabled: bool,
    pub url: String,
    pub subject: String,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "nats://localhost:4222".to_string(),
            subject: "records.committed".to_string(),
        }
    }
}

impl Config {
    /// Load `path` (any format the config crate knows) with
    /// `AUDIO_SESSION__SECTION__KEY` environment overrides
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("AUDIO_SESSION").separator("__"))
            .build()
            .with_context(|| format!("Failed to load config {}", path))?;

        Ok(settings.try_deserialize()?)
    }

    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            waveform_samples: self.waveform.samples,
            decode_duration_limit: Duration::from_secs(self.waveform.decode_limit_secs),
            info_refresh_interval: Duration::from_millis(self.recording.info_refresh_ms),
            ..SessionConfig::default()
        }
    }

    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            progress_interval: Duration::from_millis(self.recording.progress_interval_ms),
            supports_pause: self.recording.supports_pause,
        }
    }
}

impl StorageConfig {
    pub fn recordings_dir(&self) -> PathBuf {
        expand(&self.recordings_path)
    }

    pub fn records_db(&self) -> PathBuf {
        expand(&self.records_db)
    }

    pub fn settings_file(&self) -> PathBuf {
        expand(&self.settings_file)
    }
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}
