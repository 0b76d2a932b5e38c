use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::frame::AudioFrame;
use crate::recorder::{CaptureDevice, CaptureParams, DeviceError};

#[derive(Default)]
struct CaptureShared {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    channels: u16,
    sample_rate: u32,
    capturing: bool,
    paused: bool,
    /// Peak since the engine last asked
    peak: i32,
    samples_written: usize,
    /// First write failure, reported on the next amplitude read
    write_error: Option<String>,
}

/// Capture device that writes incoming PCM frames to a 16-bit WAV file
///
/// Frames arrive through a [`FrameSink`] from whatever produces audio
/// (a live input stream, a [`FileReplaySource`](super::FileReplaySource)).
/// Frames pushed while the device is not capturing, or paused, are dropped.
pub struct WavCaptureDevice {
    shared: Arc<Mutex<CaptureShared>>,
}

/// Cloneable handle feeding frames into a [`WavCaptureDevice`]
#[derive(Clone)]
pub struct FrameSink {
    shared: Arc<Mutex<CaptureShared>>,
}

impl WavCaptureDevice {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Mutex::new(CaptureShared::default())),
        }
    }

    pub fn sink(&self) -> FrameSink {
        FrameSink {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Default for WavCaptureDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSink {
    /// Write one frame if the device is capturing
    ///
    /// Stereo frames are downmixed for a mono capture; other channel
    /// mismatches are rejected.
    pub fn push(&self, frame: AudioFrame) -> Result<()> {
        let mut shared = self.shared.lock();
        if !shared.capturing || shared.paused {
            return Ok(());
        }
        if let Some(e) = &shared.write_error {
            anyhow::bail!("Capture already failed: {}", e);
        }

        let frame = if frame.channels != shared.channels && shared.channels == 1 {
            frame.to_mono()
        } else {
            frame
        };
        if frame.channels != shared.channels {
            anyhow::bail!(
                "Frame has {} channels, capture expects {}",
                frame.channels,
                shared.channels
            );
        }
        if frame.sample_rate != shared.sample_rate {
            warn!(
                "Frame sample rate {}Hz differs from capture rate {}Hz",
                frame.sample_rate, shared.sample_rate
            );
        }

        shared.peak = shared.peak.max(frame.peak());
        let written = match shared.writer.as_mut() {
            Some(writer) => frame
                .samples
                .iter()
                .try_for_each(|&sample| writer.write_sample(sample)),
            None => Ok(()),
        };
        if let Err(e) = written {
            error!("WAV write failed: {}", e);
            shared.write_error = Some(e.to_string());
            return Err(e).context("Failed to write sample to WAV");
        }
        shared.samples_written += frame.samples.len();

        Ok(())
    }

    pub fn samples_written(&self) -> usize {
        self.shared.lock().samples_written
    }
}

impl CaptureDevice for WavCaptureDevice {
    fn prepare(&mut self, output: &Path, params: &CaptureParams) -> Result<(), DeviceError> {
        let spec = hound::WavSpec {
            channels: params.channel_count,
            sample_rate: params.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let writer = hound::WavWriter::create(output, spec)
            .map_err(|e| DeviceError::Unavailable(format!("{}: {}", output.display(), e)))?;

        let mut shared = self.shared.lock();
        *shared = CaptureShared {
            writer: Some(writer),
            channels: params.channel_count,
            sample_rate: params.sample_rate,
            ..Default::default()
        };

        info!(
            "WAV capture prepared: {} ({}Hz, {} channels)",
            output.display(),
            params.sample_rate,
            params.channel_count
        );
        Ok(())
    }

    fn start(&mut self) -> Result<(), DeviceError> {
        let mut shared = self.shared.lock();
        if shared.writer.is_none() {
            return Err(DeviceError::Unavailable("device not prepared".into()));
        }
        shared.capturing = true;
        shared.paused = false;
        Ok(())
    }

    fn pause(&mut self) -> Result<(), DeviceError> {
        self.shared.lock().paused = true;
        Ok(())
    }

    fn resume(&mut self) -> Result<(), DeviceError> {
        self.shared.lock().paused = false;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        let mut shared = self.shared.lock();
        shared.capturing = false;
        if let Some(writer) = shared.writer.take() {
            writer
                .finalize()
                .map_err(|e| DeviceError::Failure(format!("Failed to finalize WAV file: {}", e)))?;
        }
        info!("WAV capture stopped ({} samples)", shared.samples_written);
        Ok(())
    }

    fn release(&mut self) {
        let mut shared = self.shared.lock();
        shared.capturing = false;
        shared.paused = false;
        if let Some(writer) = shared.writer.take() {
            if let Err(e) = writer.finalize() {
                warn!("Failed to finalize WAV writer on release: {}", e);
            }
        }
    }

    fn current_amplitude(&mut self) -> Result<i32, DeviceError> {
        let mut shared = self.shared.lock();
        if let Some(e) = &shared.write_error {
            return Err(DeviceError::Failure(format!("write failed: {}", e)));
        }
        Ok(std::mem::take(&mut shared.peak))
    }
}

impl Drop for WavCaptureDevice {
    fn drop(&mut self) {
        self.release();
    }
}
