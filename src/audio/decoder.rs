use anyhow::{Context, Result};
use async_trait::async_trait;
use std::fs::File;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, info};

use super::waveform;
use crate::error::SessionError;
use crate::record::RecordInfo;

/// Frames folded into one raw peak before fitting to the record's waveform
const PEAK_BLOCK_FRAMES: usize = 256;

/// Reads technical information and waveforms from audio containers
#[async_trait]
pub trait MetadataDecoder: Send + Sync {
    /// Duration, size and stream parameters of the file at `path`
    async fn read_info(&self, path: &Path) -> Result<RecordInfo>;

    /// Peak amplitudes of the whole file, fitted to exactly `samples` values
    async fn decode_waveform(&self, path: &Path, samples: usize) -> Result<Vec<i32>>;
}

/// [`MetadataDecoder`] backed by symphonia
///
/// Decoding is CPU bound and runs on tokio's blocking pool.
#[derive(Debug, Default, Clone)]
pub struct SymphoniaDecoder;

impl SymphoniaDecoder {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MetadataDecoder for SymphoniaDecoder {
    async fn read_info(&self, path: &Path) -> Result<RecordInfo> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || read_info_blocking(&path))
            .await
            .context("Metadata task failed")?
    }

    async fn decode_waveform(&self, path: &Path, samples: usize) -> Result<Vec<i32>> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || decode_waveform_blocking(&path, samples))
            .await
            .context("Waveform task failed")?
    }
}

struct OpenedTrack {
    format: Box<dyn FormatReader>,
    track_id: u32,
    sample_rate: u32,
    channels: usize,
}

fn open_track(path: &Path) -> Result<OpenedTrack> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| unreadable(path, e))?;

    let format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| unreadable(path, "no audio track"))?;

    Ok(OpenedTrack {
        track_id: track.id,
        sample_rate: track.codec_params.sample_rate.unwrap_or(44100),
        channels: track.codec_params.channels.map(|c| c.count()).unwrap_or(1),
        format,
    })
}

fn unreadable(path: &Path, reason: impl std::fmt::Display) -> anyhow::Error {
    anyhow::Error::new(SessionError::UnreadableSource(format!(
        "{}: {}",
        path.display(),
        reason
    )))
}

fn read_info_blocking(path: &Path) -> Result<RecordInfo> {
    let size = std::fs::metadata(path)
        .with_context(|| format!("Failed to stat {}", path.display()))?
        .len();

    let mut opened = open_track(path)?;
    let params = opened
        .format
        .tracks()
        .iter()
        .find(|t| t.id == opened.track_id)
        .map(|t| t.codec_params.clone())
        .ok_or_else(|| unreadable(path, "track disappeared"))?;

    let frames = match params.n_frames {
        Some(frames) => frames,
        None => count_frames(&mut opened),
    };
    let duration_ms = frames * 1000 / opened.sample_rate.max(1) as u64;

    let bitrate = if duration_ms > 0 {
        (size * 8 * 1000 / duration_ms) as u32
    } else {
        opened.sample_rate * opened.channels as u32 * params.bits_per_sample.unwrap_or(16)
    };

    let format = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_else(|| "unknown".to_string());

    debug!(
        "Read info for {}: {}ms, {}Hz, {} channels",
        path.display(),
        duration_ms,
        opened.sample_rate,
        opened.channels
    );

    Ok(RecordInfo {
        duration_ms,
        size,
        sample_rate: opened.sample_rate,
        channel_count: opened.channels as u16,
        bitrate,
        format,
    })
}

/// Sum packet durations for containers that do not declare a frame count
fn count_frames(opened: &mut OpenedTrack) -> u64 {
    let mut frames = 0;
    while let Ok(packet) = opened.format.next_packet() {
        if packet.track_id() == opened.track_id {
            frames += packet.dur();
        }
    }
    frames
}

fn decode_waveform_blocking(path: &Path, samples: usize) -> Result<Vec<i32>> {
    let mut opened = open_track(path)?;
    let params = opened
        .format
        .tracks()
        .iter()
        .find(|t| t.id == opened.track_id)
        .map(|t| t.codec_params.clone())
        .ok_or_else(|| unreadable(path, "track disappeared"))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&params, &DecoderOptions::default())
        .map_err(|e| unreadable(path, e))?;

    let channels = opened.channels.max(1);
    let mut peaks: Vec<i32> = Vec::new();
    let mut block_peak = 0f32;
    let mut block_frames = 0usize;

    loop {
        let packet = match opened.format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(unreadable(path, e)),
        };

        if packet.track_id() != opened.track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // Corrupt packets are skipped, the rest of the stream is still usable
            Err(SymphoniaError::DecodeError(e)) => {
                debug!("Skipping undecodable packet in {}: {}", path.display(), e);
                continue;
            }
            Err(e) => return Err(unreadable(path, e)),
        };

        let spec = *decoded.spec();
        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);

        for frame in buffer.samples().chunks(channels) {
            for sample in frame {
                block_peak = block_peak.max(sample.abs());
            }
            block_frames += 1;
            if block_frames == PEAK_BLOCK_FRAMES {
                peaks.push(waveform::to_amplitude(block_peak));
                block_peak = 0.0;
                block_frames = 0;
            }
        }
    }

    if block_frames > 0 {
        peaks.push(waveform::to_amplitude(block_peak));
    }
    if peaks.is_empty() {
        return Err(unreadable(path, "no audio samples"));
    }

    info!(
        "Decoded waveform for {} ({} Hz, {} blocks)",
        path.display(),
        opened.sample_rate,
        peaks.len()
    );

    Ok(waveform::fit(&peaks, samples))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use tempfile::TempDir;

    fn write_tone(path: &Path, millis: u32) -> Result<()> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec)?;
        for i in 0..(8 * millis) {
            let t = i as f32 / 8000.0;
            writer.write_sample(((t * 440.0 * std::f32::consts::TAU).sin() * 12000.0) as i16)?;
        }
        writer.finalize()?;
        Ok(())
    }

    #[tokio::test]
    async fn test_read_info_from_wav() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("tone.wav");
        write_tone(&path, 1500)?;

        let info = SymphoniaDecoder::new().read_info(&path).await?;
        assert_eq!(info.duration_ms, 1500);
        assert_eq!(info.sample_rate, 8000);
        assert_eq!(info.channel_count, 1);
        assert_eq!(info.format, "wav");
        assert_eq!(info.size, std::fs::metadata(&path)?.len());
        assert!(info.bitrate > 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_decode_waveform_has_requested_length() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("tone.wav");
        write_tone(&path, 1000)?;

        let waveform = SymphoniaDecoder::new().decode_waveform(&path, 50).await?;
        assert_eq!(waveform.len(), 50);
        assert!(waveform.iter().all(|&a| a > 0));
        Ok(())
    }

    #[tokio::test]
    async fn test_garbage_is_unreadable() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("broken.wav");
        std::fs::write(&path, b"definitely not a riff header")?;

        let err = SymphoniaDecoder::new().read_info(&path).await.unwrap_err();
        let classified = SessionError::classify(&err, SessionError::PersistenceFailure);
        assert_eq!(classified.code(), ErrorCode::UnreadableFile);
        Ok(())
    }
}
