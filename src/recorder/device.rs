use std::path::Path;
use thiserror::Error;

/// Parameters the capture device is prepared with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureParams {
    pub channel_count: u16,
    pub sample_rate: u32,
    pub bitrate: u32,
}

/// Failures reported by a capture device
///
/// `Unavailable` only happens while acquiring the device (prepare/start);
/// `Failure` means an already running capture broke.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("capture device unavailable: {0}")]
    Unavailable(String),

    #[error("capture device failure: {0}")]
    Failure(String),
}

/// Audio capture hardware as seen by the recording engine
///
/// Calls are cheap and synchronous. The engine guarantees the call order
/// `prepare -> start -> (pause -> resume)* -> stop -> release`.
pub trait CaptureDevice: Send {
    /// Acquire the device and bind it to `output`
    fn prepare(&mut self, output: &Path, params: &CaptureParams) -> Result<(), DeviceError>;

    fn start(&mut self) -> Result<(), DeviceError>;

    fn pause(&mut self) -> Result<(), DeviceError>;

    fn resume(&mut self) -> Result<(), DeviceError>;

    /// Stop capturing and finalize the output file
    fn stop(&mut self) -> Result<(), DeviceError>;

    /// Give the device back; safe to call in any state
    fn release(&mut self);

    /// Peak amplitude since the previous call, on a 16-bit scale
    fn current_amplitude(&mut self) -> Result<i32, DeviceError>;
}
