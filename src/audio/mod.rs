//! Audio I/O
//!
//! - `WavCaptureDevice` / `FrameSink`: capture device writing 16-bit WAV
//! - `AudioFile` / `FileReplaySource`: WAV input used to feed a capture
//! - `SymphoniaDecoder`: container metadata and waveform peaks
//! - `waveform`: fitting amplitude samples to a record's waveform length

mod decoder;
mod file;
mod frame;
mod wav;
pub mod waveform;

pub use decoder::{MetadataDecoder, SymphoniaDecoder};
pub use file::{AudioFile, FileReplaySource};
pub use frame::AudioFrame;
pub use wav::{FrameSink, WavCaptureDevice};
