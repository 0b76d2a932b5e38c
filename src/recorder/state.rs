use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::error::ErrorCode;

/// State of the recording engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecorderState {
    /// Nothing captured, ready to start
    #[default]
    Idle,
    /// Capturing and sampling progress
    Recording,
    /// Capture suspended, duration frozen
    Paused,
    /// Device broke mid-capture; only `start` leaves this state
    Error,
}

/// Errors reported by the recording engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecorderError {
    #[error("output file {0} does not exist or is not writable")]
    InvalidOutputFile(PathBuf),

    #[error("failed to initialise capture device: {0}")]
    InitFailed(String),

    #[error("capture device failed: {0}")]
    DeviceFailed(String),

    #[error("cannot {op} while {state:?}")]
    InvalidState {
        op: &'static str,
        state: RecorderState,
    },
}

impl RecorderError {
    pub fn code(&self) -> ErrorCode {
        match self {
            RecorderError::InvalidOutputFile(_) => ErrorCode::InvalidOutputFile,
            RecorderError::InitFailed(_)
            | RecorderError::DeviceFailed(_)
            | RecorderError::InvalidState { .. } => ErrorCode::RecorderInit,
        }
    }
}

/// Callbacks emitted by the engine, one per state transition plus progress ticks
#[derive(Debug, Clone, PartialEq)]
pub enum RecorderEvent {
    Started { path: PathBuf },
    Paused { duration_ms: u64 },
    Resumed,
    Stopped { path: PathBuf, duration_ms: u64 },
    Progress { duration_ms: u64, amplitude: i32 },
    Error(RecorderError),
}

/// Construction-time options of the recording engine
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Interval between progress samples
    pub progress_interval: Duration,

    /// Whether the platform can pause a capture; without it `pause` stops
    pub supports_pause: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            progress_interval: Duration::from_millis(100),
            supports_pause: true,
        }
    }
}
