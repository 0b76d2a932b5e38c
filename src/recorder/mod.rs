//! Recording engine
//!
//! This module provides the `RecordingEngine` state machine that wraps a
//! capture device:
//! - start / pause / resume / stop with precondition checks
//! - pause fallback to stop on platforms without native pause
//! - drift-free duration accounting across pause/resume cycles
//! - periodic progress sampling (duration + amplitude)

mod device;
mod engine;
mod state;

pub use device::{CaptureDevice, CaptureParams, DeviceError};
pub use engine::{RecorderListener, RecordingEngine};
pub use state::{EngineConfig, RecorderError, RecorderEvent, RecorderState};
