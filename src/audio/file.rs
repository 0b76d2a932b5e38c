use anyhow::{Context, Result};
use hound::WavReader;
use std::path::Path;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::frame::AudioFrame;
use super::wav::FrameSink;

/// A WAV file loaded into memory
pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path).context("Failed to open WAV file")?;

        let spec = reader.spec();
        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    /// Split the file into consecutive frames of `frame_ms` each
    pub fn frames(&self, frame_ms: u64) -> Vec<AudioFrame> {
        let per_frame = (self.sample_rate as u64 * frame_ms / 1000) as usize * self.channels as usize;
        if per_frame == 0 {
            return Vec::new();
        }

        self.samples
            .chunks(per_frame)
            .enumerate()
            .map(|(i, chunk)| AudioFrame {
                samples: chunk.to_vec(),
                sample_rate: self.sample_rate,
                channels: self.channels,
                timestamp_ms: i as u64 * frame_ms,
            })
            .collect()
    }
}

/// Streams a WAV file into a capture device at real-time pace
///
/// Stands in for a live input when testing a capture end to end.
pub struct FileReplaySource {
    file: AudioFile,
    frame_ms: u64,
}

impl FileReplaySource {
    pub fn open(path: impl AsRef<Path>, frame_ms: u64) -> Result<Self> {
        Ok(Self {
            file: AudioFile::open(path)?,
            frame_ms: frame_ms.max(1),
        })
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.file.duration_seconds)
    }

    /// Push every frame into `sink`, one per `frame_ms`
    pub fn spawn(self, sink: FrameSink) -> JoinHandle<()> {
        tokio::spawn(async move {
            let frames = self.file.frames(self.frame_ms);
            let total = frames.len();
            let mut ticker = tokio::time::interval(Duration::from_millis(self.frame_ms));

            for frame in frames {
                ticker.tick().await;
                if let Err(e) = sink.push(frame) {
                    warn!("Replay of {} stopped: {:#}", self.file.path, e);
                    return;
                }
            }

            info!("Replayed {} frames from {}", total, self.file.path);
        })
    }
}
