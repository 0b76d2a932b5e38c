use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::{PlaybackEngine, PlaybackError, PlaybackEvent, PlaybackListener, PlayerState};

#[derive(Default)]
struct ClockInner {
    state: PlayerState,
    path: Option<PathBuf>,
    duration: Duration,
    position: Duration,
    last_tick: Option<Instant>,
    ticker: Option<JoinHandle<()>>,
    epoch: u64,
}

impl ClockInner {
    fn advance(&mut self, now: Instant) {
        if let Some(last) = self.last_tick {
            self.position = (self.position + now.saturating_duration_since(last)).min(self.duration);
            self.last_tick = Some(now);
        }
    }

    fn halt_ticker(&mut self) {
        self.epoch += 1;
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }

    fn position_ms(&self) -> u64 {
        self.position.as_millis() as u64
    }
}

/// Playback engine that only keeps time
///
/// Position advances with the tokio clock and progress is reported every
/// `interval`; no audio is rendered. Used headless and in tests.
pub struct ClockPlayer {
    inner: Arc<Mutex<ClockInner>>,
    listener: Arc<RwLock<Option<PlaybackListener>>>,
    interval: Duration,
}

impl ClockPlayer {
    pub fn new(interval: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ClockInner::default())),
            listener: Arc::new(RwLock::new(None)),
            interval,
        }
    }

    fn arm_ticker(&self, inner: &mut ClockInner) {
        inner.halt_ticker();
        let epoch = inner.epoch;
        let player = Arc::downgrade(&self.inner);
        let listener = Arc::clone(&self.listener);
        let period = self.interval;

        inner.ticker = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let Some(strong) = player.upgrade() else {
                    break;
                };

                let (position_ms, finished) = {
                    let mut inner = strong.lock();
                    if inner.epoch != epoch || inner.state != PlayerState::Playing {
                        break;
                    }
                    inner.advance(Instant::now());
                    let finished = inner.position >= inner.duration;
                    if finished {
                        inner.state = PlayerState::Stopped;
                        inner.last_tick = None;
                        inner.position = Duration::ZERO;
                        inner.path = None;
                        inner.ticker = None;
                    }
                    (inner.position_ms(), finished)
                };

                if finished {
                    debug!("Playback reached the end");
                    emit_to(&listener, PlaybackEvent::Stopped);
                    break;
                }
                emit_to(&listener, PlaybackEvent::Progress { position_ms });
            }
        }));
    }

    fn emit(&self, event: PlaybackEvent) {
        emit_to(&self.listener, event);
    }
}

impl PlaybackEngine for ClockPlayer {
    fn set_listener(&self, listener: Option<PlaybackListener>) {
        *self.listener.write() = listener;
    }

    fn play(&self, path: &Path, duration_ms: u64) -> Result<(), PlaybackError> {
        if !path.is_file() {
            let err = PlaybackError::NotFound(path.to_path_buf());
            warn!("{}", err);
            self.emit(PlaybackEvent::Error(err.clone()));
            return Err(err);
        }

        {
            let mut inner = self.inner.lock();
            inner.halt_ticker();
            inner.state = PlayerState::Playing;
            inner.path = Some(path.to_path_buf());
            inner.duration = Duration::from_millis(duration_ms);
            inner.position = Duration::ZERO;
            inner.last_tick = Some(Instant::now());
            self.arm_ticker(&mut inner);
        }

        info!("Playing {}", path.display());
        self.emit(PlaybackEvent::Started { position_ms: 0 });
        Ok(())
    }

    fn pause(&self) {
        let position_ms = {
            let mut inner = self.inner.lock();
            if inner.state != PlayerState::Playing {
                return;
            }
            inner.advance(Instant::now());
            inner.last_tick = None;
            inner.halt_ticker();
            inner.state = PlayerState::Paused;
            inner.position_ms()
        };
        self.emit(PlaybackEvent::Paused { position_ms });
    }

    fn unpause(&self) {
        let position_ms = {
            let mut inner = self.inner.lock();
            if inner.state != PlayerState::Paused {
                return;
            }
            inner.state = PlayerState::Playing;
            inner.last_tick = Some(Instant::now());
            self.arm_ticker(&mut inner);
            inner.position_ms()
        };
        self.emit(PlaybackEvent::Started { position_ms });
    }

    fn seek(&self, position_ms: u64) {
        let position_ms = {
            let mut inner = self.inner.lock();
            if inner.state == PlayerState::Stopped {
                return;
            }
            inner.position = Duration::from_millis(position_ms).min(inner.duration);
            if inner.state == PlayerState::Playing {
                inner.last_tick = Some(Instant::now());
            }
            inner.position_ms()
        };
        self.emit(PlaybackEvent::Progress { position_ms });
    }

    fn stop(&self) {
        {
            let mut inner = self.inner.lock();
            if inner.state == PlayerState::Stopped {
                return;
            }
            inner.halt_ticker();
            inner.state = PlayerState::Stopped;
            inner.position = Duration::ZERO;
            inner.last_tick = None;
            inner.path = None;
        }
        self.emit(PlaybackEvent::Stopped);
    }

    fn state(&self) -> PlayerState {
        self.inner.lock().state
    }

    fn position_ms(&self) -> u64 {
        let mut inner = self.inner.lock();
        inner.advance(Instant::now());
        inner.position_ms()
    }

    fn current_path(&self) -> Option<PathBuf> {
        self.inner.lock().path.clone()
    }
}

impl Drop for ClockPlayer {
    fn drop(&mut self) {
        self.inner.lock().halt_ticker();
    }
}

fn emit_to(listener: &RwLock<Option<PlaybackListener>>, event: PlaybackEvent) {
    let listener = listener.read().clone();
    if let Some(listener) = listener {
        listener(event);
    }
}
