use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Orchestrator-facing options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Tag attached to every log line of this session
    pub session_id: String,

    /// Number of amplitude samples stored per record
    /// Default: 600
    pub waveform_samples: usize,

    /// Records at least this long keep their placeholder waveform
    /// Default: 60 minutes
    pub decode_duration_limit: Duration,

    /// Minimum time between information refreshes while recording
    /// Default: 3 seconds
    pub info_refresh_interval: Duration,

    /// Minimum time between two legacy storage checks
    /// Default: 72 hours
    pub legacy_check_cooldown: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("session-{}", uuid::Uuid::new_v4()),
            waveform_samples: 600,
            decode_duration_limit: Duration::from_secs(60 * 60),
            info_refresh_interval: Duration::from_secs(3),
            legacy_check_cooldown: Duration::from_secs(72 * 60 * 60),
        }
    }
}
