// Shared harness for session integration tests
//
// Builds an orchestrator over real file storage in a temp dir, an
// in-memory record store and settings, and an observer that records
// every event it is told.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use audio_session::audio::FrameSink;
use audio_session::error::ErrorCode;
use audio_session::record::{Record, RecordId, NO_ID};
use audio_session::recorder::EngineConfig;
use audio_session::session::{
    Collaborators, SessionConfig, SessionEvent, SessionObserver, SessionOrchestrator,
    METADATA_MIGRATION_VERSION,
};
use audio_session::storage::{
    JsonRecordStore, JsonSettings, LocalFileStore, RecordStore, Settings, SettingsStore,
};
use audio_session::{ClockPlayer, SymphoniaDecoder, WavCaptureDevice};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;

pub const WAVEFORM_SAMPLES: usize = 100;

/// Observer keeping every notification in arrival order
#[derive(Clone, Default)]
pub struct EventRecorder {
    events: Arc<Mutex<Vec<SessionEvent>>>,
}

impl EventRecorder {
    pub fn observer(&self) -> Arc<dyn SessionObserver> {
        let events = Arc::clone(&self.events);
        Arc::new(move |event: SessionEvent| events.lock().push(event))
    }

    pub fn events(&self) -> Vec<SessionEvent> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    pub fn loaded(&self) -> Vec<Record> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SessionEvent::RecordLoaded { record } => Some(record),
                _ => None,
            })
            .collect()
    }

    pub fn contains(&self, wanted: &SessionEvent) -> bool {
        self.events().iter().any(|e| e == wanted)
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub session: SessionOrchestrator,
    pub records: Arc<dyn RecordStore>,
    pub settings: Arc<dyn SettingsStore>,
    pub sink: FrameSink,
    pub recorder: EventRecorder,
}

/// How a [`Harness`] is put together
pub struct HarnessOptions {
    pub settings: Settings,
    pub config: SessionConfig,
    pub quota_bytes: Option<u64>,
    /// Replaces the in-memory record store
    pub records: Option<Arc<dyn RecordStore>>,
    /// Replaces the in-memory settings; `settings` is ignored then
    pub settings_store: Option<Arc<dyn SettingsStore>>,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            settings: migrated_settings(),
            config: SessionConfig {
                waveform_samples: WAVEFORM_SAMPLES,
                ..SessionConfig::default()
            },
            quota_bytes: None,
            records: None,
            settings_store: None,
        }
    }
}

/// Settings of a store that needs no migration
pub fn migrated_settings() -> Settings {
    Settings {
        migration_version: METADATA_MIGRATION_VERSION,
        sample_rate: 8000,
        ..Settings::default()
    }
}

impl Harness {
    /// Session with migrations already applied
    pub fn new() -> Result<Self> {
        Self::build(HarnessOptions::default())
    }

    pub fn with_settings(settings: Settings) -> Result<Self> {
        Self::build(HarnessOptions {
            settings,
            ..HarnessOptions::default()
        })
    }

    pub fn build(options: HarnessOptions) -> Result<Self> {
        let dir = TempDir::new()?;
        let records: Arc<dyn RecordStore> = match options.records {
            Some(records) => records,
            None => Arc::new(JsonRecordStore::in_memory()),
        };
        let settings: Arc<dyn SettingsStore> = match options.settings_store {
            Some(settings) => settings,
            None => Arc::new(JsonSettings::in_memory(options.settings)),
        };
        let device = WavCaptureDevice::new();
        let sink = device.sink();

        let parts = Collaborators {
            device: Box::new(device),
            engine: EngineConfig {
                progress_interval: Duration::from_millis(20),
                supports_pause: true,
            },
            player: Arc::new(ClockPlayer::new(Duration::from_millis(20))),
            records: records.clone(),
            files: Arc::new(LocalFileStore::new(
                dir.path().join("recordings"),
                options.quota_bytes,
            )?),
            decoder: Arc::new(SymphoniaDecoder::new()),
            settings: settings.clone(),
        };

        Ok(Self {
            dir,
            session: SessionOrchestrator::new(parts, options.config),
            records,
            settings,
            sink,
            recorder: EventRecorder::default(),
        })
    }

    /// Error codes the observer was told about, in order
    pub fn error_codes(&self) -> Vec<ErrorCode> {
        self.recorder
            .events()
            .into_iter()
            .filter_map(|e| match e {
                SessionEvent::Error { code, .. } => Some(code),
                _ => None,
            })
            .collect()
    }

    pub async fn attach(&self) {
        self.session.attach(self.recorder.observer());
        self.session.settle().await;
    }

    pub fn recordings_dir(&self) -> PathBuf {
        self.dir.path().join("recordings")
    }

    pub fn recording_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(self.recordings_dir())? {
            files.push(entry?.path());
        }
        files.sort();
        Ok(files)
    }

    /// Write a source WAV outside the recordings directory
    pub fn source_wav(&self, name: &str, sample_rate: u32, duration_ms: u32) -> Result<PathBuf> {
        let source_dir = self.dir.path().join("sources");
        std::fs::create_dir_all(&source_dir)?;
        let path = source_dir.join(name);
        write_wav(&path, sample_rate, duration_ms)?;
        Ok(path)
    }

    /// Import `path` and wait for both phases; returns the stored record
    pub async fn import(&self, path: &Path) -> Result<Record> {
        self.session.import_file(path);
        self.session.settle().await;

        let id = self.settings.active_record();
        anyhow::ensure!(id != NO_ID, "import of {} produced no record", path.display());
        self.records
            .get(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("record {} missing", id))
    }
}

/// Record store whose updates can be made to fail
pub struct FlakyRecords {
    inner: JsonRecordStore,
    fail_updates: AtomicBool,
}

impl FlakyRecords {
    pub fn new() -> Self {
        Self {
            inner: JsonRecordStore::in_memory(),
            fail_updates: AtomicBool::new(false),
        }
    }

    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl RecordStore for FlakyRecords {
    async fn insert(&self, record: Record) -> Result<Record> {
        self.inner.insert(record).await
    }

    async fn update(&self, record: &Record) -> Result<bool> {
        if self.fail_updates.load(Ordering::SeqCst) {
            anyhow::bail!("database is locked");
        }
        self.inner.update(record).await
    }

    async fn get(&self, id: RecordId) -> Result<Option<Record>> {
        self.inner.get(id).await
    }

    async fn soft_delete(&self, id: RecordId) -> Result<bool> {
        self.inner.soft_delete(id).await
    }

    async fn hard_delete(&self, id: RecordId) -> Result<bool> {
        self.inner.hard_delete(id).await
    }

    async fn active_ids(&self) -> Result<Vec<RecordId>> {
        self.inner.active_ids().await
    }

    async fn trash_ids(&self) -> Result<Vec<RecordId>> {
        self.inner.trash_ids().await
    }

    async fn has_any_path_under(&self, dir: &Path) -> Result<bool> {
        self.inner.has_any_path_under(dir).await
    }

    fn subscribe_lost(&self) -> broadcast::Receiver<Vec<Record>> {
        self.inner.subscribe_lost()
    }
}

/// Settings whose first write blocks until [`GatedSettings::open`]
pub struct GatedSettings {
    inner: JsonSettings,
    gate: Mutex<Option<mpsc::Receiver<()>>>,
    opener: mpsc::Sender<()>,
}

impl GatedSettings {
    pub fn new(settings: Settings) -> Self {
        let (opener, gate) = mpsc::channel();
        Self {
            inner: JsonSettings::in_memory(settings),
            gate: Mutex::new(Some(gate)),
            opener,
        }
    }

    pub fn open(&self) {
        let _ = self.opener.send(());
    }
}

impl SettingsStore for GatedSettings {
    fn snapshot(&self) -> Settings {
        self.inner.snapshot()
    }

    fn update(&self, apply: &mut dyn FnMut(&mut Settings)) -> Result<()> {
        let gate = self.gate.lock().take();
        if let Some(gate) = gate {
            gate.recv_timeout(Duration::from_secs(5))?;
        }
        self.inner.update(apply)
    }
}

/// Mono 16-bit sawtooth so every waveform bucket has a non-zero peak
pub fn write_wav(path: &Path, sample_rate: u32, duration_ms: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    let total = sample_rate as u64 * duration_ms as u64 / 1000;
    for i in 0..total {
        writer.write_sample(((i % 200) as i16 - 100) * 150)?;
    }
    writer.finalize()?;
    Ok(())
}
