use parking_lot::{Mutex, RwLock};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::device::{CaptureDevice, CaptureParams, DeviceError};
use super::state::{EngineConfig, RecorderError, RecorderEvent, RecorderState};

/// Receives every engine callback, synchronously on the calling thread
pub type RecorderListener = Arc<dyn Fn(RecorderEvent) + Send + Sync>;

/// Bookkeeping for the capture currently in flight
struct RecordingSession {
    output: PathBuf,
    accumulated: Duration,
    /// Last duration sample; `None` while paused
    last_tick: Option<Instant>,
}

impl RecordingSession {
    fn new(output: PathBuf, now: Instant) -> Self {
        Self {
            output,
            accumulated: Duration::ZERO,
            last_tick: Some(now),
        }
    }

    /// Fold the wall-clock delta since the last sample into the total
    fn sample(&mut self, now: Instant) -> Duration {
        if let Some(last) = self.last_tick {
            self.accumulated += now.saturating_duration_since(last);
            self.last_tick = Some(now);
        }
        self.accumulated
    }

    fn live_duration(&self, now: Instant) -> Duration {
        let running = self
            .last_tick
            .map(|last| now.saturating_duration_since(last))
            .unwrap_or_default();
        self.accumulated + running
    }
}

struct EngineInner {
    state: RecorderState,
    device: Box<dyn CaptureDevice>,
    session: Option<RecordingSession>,
    sampler: Option<JoinHandle<()>>,
    /// Bumped on every arm/disarm so a stale sampler stops itself
    sampler_epoch: u64,
}

impl EngineInner {
    fn disarm_sampler(&mut self) {
        self.sampler_epoch += 1;
        if let Some(sampler) = self.sampler.take() {
            sampler.abort();
        }
    }

    fn sample_progress(&mut self) -> RecorderEvent {
        let duration = self
            .session
            .as_mut()
            .map(|s| s.sample(Instant::now()))
            .unwrap_or_default();

        let amplitude = match self.device.current_amplitude() {
            Ok(amplitude) => amplitude,
            Err(e @ DeviceError::Failure(_)) => return self.fail("sample", e),
            Err(e) => {
                warn!("Failed to read amplitude: {}", e);
                0
            }
        };

        RecorderEvent::Progress {
            duration_ms: duration.as_millis() as u64,
            amplitude,
        }
    }

    /// Move to `Error` after a mid-capture device failure
    fn fail(&mut self, op: &str, err: DeviceError) -> RecorderEvent {
        error!("Capture device failed during {}: {}", op, err);
        self.disarm_sampler();
        self.device.release();
        self.session = None;
        self.state = RecorderState::Error;
        RecorderEvent::Error(RecorderError::DeviceFailed(err.to_string()))
    }
}

/// State machine around a capture device
///
/// `Idle -> Recording -> Paused -> Recording -> Idle`, plus `Error` when the
/// device breaks mid-capture. Every transition emits exactly one
/// [`RecorderEvent`]; while recording, a progress sample is emitted every
/// `progress_interval`.
pub struct RecordingEngine {
    inner: Arc<Mutex<EngineInner>>,
    listener: Arc<RwLock<Option<RecorderListener>>>,
    config: EngineConfig,
}

impl RecordingEngine {
    pub fn new(device: Box<dyn CaptureDevice>, config: EngineConfig) -> Self {
        info!(
            "Recording engine initialized (progress every {:?}, pause supported: {})",
            config.progress_interval, config.supports_pause
        );

        Self {
            inner: Arc::new(Mutex::new(EngineInner {
                state: RecorderState::Idle,
                device,
                session: None,
                sampler: None,
                sampler_epoch: 0,
            })),
            listener: Arc::new(RwLock::new(None)),
            config,
        }
    }

    pub fn set_listener(&self, listener: Option<RecorderListener>) {
        *self.listener.write() = listener;
    }

    /// Start capturing into `output`, which must be an existing writable file
    ///
    /// Valid from `Idle` (and `Error`, which it resets).
    pub fn start(&self, output: &Path, params: CaptureParams) -> Result<(), RecorderError> {
        let outcome = {
            let mut inner = self.inner.lock();

            if !matches!(inner.state, RecorderState::Idle | RecorderState::Error) {
                warn!("Recording already started");
                return Err(RecorderError::InvalidState {
                    op: "start",
                    state: inner.state,
                });
            }

            if !is_writable_file(output) {
                Err(RecorderError::InvalidOutputFile(output.to_path_buf()))
            } else {
                match acquire(inner.device.as_mut(), output, &params) {
                    Ok(()) => {
                        inner.session = Some(RecordingSession::new(output.to_path_buf(), Instant::now()));
                        inner.state = RecorderState::Recording;
                        self.arm_sampler(&mut inner);
                        Ok(RecorderEvent::Started {
                            path: output.to_path_buf(),
                        })
                    }
                    Err(e) => {
                        error!("prepare() failed: {}", e);
                        inner.device.release();
                        inner.state = RecorderState::Idle;
                        Err(RecorderError::InitFailed(e.to_string()))
                    }
                }
            }
        };

        match outcome {
            Ok(event) => {
                info!("Recording started: {}", output.display());
                self.emit(event);
                Ok(())
            }
            Err(e) => {
                self.emit(RecorderEvent::Error(e.clone()));
                Err(e)
            }
        }
    }

    /// Suspend the capture; degrades to [`stop`](Self::stop) when the
    /// platform cannot pause
    pub fn pause(&self) -> Result<(), RecorderError> {
        if !self.config.supports_pause {
            debug!("Pause not supported, stopping instead");
            return self.stop();
        }

        let event = {
            let mut inner = self.inner.lock();

            if inner.state != RecorderState::Recording {
                debug!("Ignoring pause while {:?}", inner.state);
                return Ok(());
            }

            match inner.device.pause() {
                Ok(()) => {
                    let duration = match inner.session.as_mut() {
                        Some(session) => {
                            let total = session.sample(Instant::now());
                            session.last_tick = None;
                            total
                        }
                        None => Duration::ZERO,
                    };
                    inner.disarm_sampler();
                    inner.state = RecorderState::Paused;
                    RecorderEvent::Paused {
                        duration_ms: duration.as_millis() as u64,
                    }
                }
                Err(e) => inner.fail("pause", e),
            }
        };

        self.finish(event)
    }

    /// Continue a paused capture; no-op in any other state
    pub fn resume(&self) -> Result<(), RecorderError> {
        let event = {
            let mut inner = self.inner.lock();

            if !self.config.supports_pause || inner.state != RecorderState::Paused {
                debug!("Ignoring resume while {:?}", inner.state);
                return Ok(());
            }

            match inner.device.resume() {
                Ok(()) => {
                    if let Some(session) = inner.session.as_mut() {
                        session.last_tick = Some(Instant::now());
                    }
                    inner.state = RecorderState::Recording;
                    self.arm_sampler(&mut inner);
                    RecorderEvent::Resumed
                }
                Err(e) => inner.fail("resume", e),
            }
        };

        self.finish(event)
    }

    /// Finish the capture and return to `Idle`
    pub fn stop(&self) -> Result<(), RecorderError> {
        let event = {
            let mut inner = self.inner.lock();

            if !matches!(inner.state, RecorderState::Recording | RecorderState::Paused) {
                warn!("Recording has already stopped or hasn't started");
                return Ok(());
            }

            inner.disarm_sampler();
            if let Err(e) = inner.device.stop() {
                error!("stop() problems: {}", e);
            }
            inner.device.release();
            inner.state = RecorderState::Idle;

            match inner.session.take() {
                Some(mut session) => {
                    let duration = session.sample(Instant::now());
                    RecorderEvent::Stopped {
                        path: session.output,
                        duration_ms: duration.as_millis() as u64,
                    }
                }
                None => RecorderEvent::Stopped {
                    path: PathBuf::new(),
                    duration_ms: 0,
                },
            }
        };

        info!("Recording stopped");
        self.finish(event)
    }

    pub fn state(&self) -> RecorderState {
        self.inner.lock().state
    }

    /// True while a capture is in flight, paused or not
    pub fn is_recording(&self) -> bool {
        matches!(self.state(), RecorderState::Recording | RecorderState::Paused)
    }

    pub fn is_paused(&self) -> bool {
        self.state() == RecorderState::Paused
    }

    pub fn supports_pause(&self) -> bool {
        self.config.supports_pause
    }

    /// Accumulated duration of the current capture
    pub fn duration_ms(&self) -> u64 {
        self.inner
            .lock()
            .session
            .as_ref()
            .map(|s| s.live_duration(Instant::now()).as_millis() as u64)
            .unwrap_or(0)
    }

    pub fn output_path(&self) -> Option<PathBuf> {
        self.inner.lock().session.as_ref().map(|s| s.output.clone())
    }

    fn arm_sampler(&self, inner: &mut EngineInner) {
        inner.disarm_sampler();
        let epoch = inner.sampler_epoch;
        let engine = Arc::downgrade(&self.inner);
        let listener = Arc::clone(&self.listener);
        let period = self.config.progress_interval;

        inner.sampler = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                let Some(strong) = engine.upgrade() else {
                    break;
                };
                let event = {
                    let mut inner = strong.lock();
                    if inner.sampler_epoch != epoch || inner.state != RecorderState::Recording {
                        break;
                    }
                    inner.sample_progress()
                };
                let failed = matches!(event, RecorderEvent::Error(_));
                emit_to(&listener, event);
                if failed {
                    break;
                }
            }
        }));
    }

    fn finish(&self, event: RecorderEvent) -> Result<(), RecorderError> {
        let result = match &event {
            RecorderEvent::Error(e) => Err(e.clone()),
            _ => Ok(()),
        };
        self.emit(event);
        result
    }

    fn emit(&self, event: RecorderEvent) {
        emit_to(&self.listener, event);
    }
}

impl Drop for RecordingEngine {
    fn drop(&mut self) {
        let mut inner = self.inner.lock();
        inner.disarm_sampler();
        if matches!(inner.state, RecorderState::Recording | RecorderState::Paused) {
            warn!("Recording engine dropped mid-capture, releasing device");
            if let Err(e) = inner.device.stop() {
                error!("stop() problems: {}", e);
            }
            inner.device.release();
        }
    }
}

fn acquire(device: &mut dyn CaptureDevice, output: &Path, params: &CaptureParams) -> Result<(), DeviceError> {
    device.prepare(output, params)?;
    device.start()
}

fn emit_to(listener: &RwLock<Option<RecorderListener>>, event: RecorderEvent) {
    // Clone out so the listener runs without the lock held
    let listener = listener.read().clone();
    if let Some(listener) = listener {
        listener(event);
    }
}

fn is_writable_file(path: &Path) -> bool {
    path.is_file() && OpenOptions::new().append(true).open(path).is_ok()
}
