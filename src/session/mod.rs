//! Capture session state machine.
//!
//! A [`CaptureSession`] owns one camera stream and one detector for its
//! whole lifetime and sequences them through
//! `Launch → Camera ⇄ Detecting → Countdown → Capturing → Preview →
//! Uploading → Success`, with `Failure` for startup problems and
//! `Cancelled` reachable from everywhere.
//!
//! The session runs as a single task. Detector calls, uploads and timers
//! run as separate tasks and post their results back; the session ignores
//! anything that arrives after it has ended.

mod callbacks;
mod controller;
mod error;
mod events;
mod manager;
mod state;
mod stats;
mod upload;

pub use callbacks::SessionCallbacks;
pub use controller::{CaptureSession, SessionHandle, SessionReport, SessionSummary};
pub use error::{CaptureError, SessionOutcome};
pub use events::{SessionCommand, SessionEvent};
pub use manager::SessionManager;
pub use state::{CaptureState, CapturedFrames};
pub use stats::SessionStats;
pub use upload::{run_upload, UploadError, UploadPhase, UploadProgress, UploadReceipt};

use crate::capture::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which backend operation an upload performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    Register,
    Verify,
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionMode::Register => f.write_str("register"),
            SessionMode::Verify => f.write_str("verify"),
        }
    }
}

/// Session section of the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub mode: SessionMode,
    /// Hard cap on stored shots.
    pub max_shots: usize,
    /// Shots collected before review.
    pub shots_per_session: usize,
    /// Countdown length in ticks.
    pub countdown_ticks: u32,
    pub countdown_tick_ms: u64,
    /// Delay after scanning starts before manual capture is offered.
    pub manual_grace_ms: u64,
    /// Extra confirmed frames in `Detecting` before the countdown starts.
    pub hold_frames: u32,
    /// Start the countdown automatically.
    pub auto_capture: bool,
    /// Longest wait for the capture frame.
    pub capture_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mode: SessionMode::Verify,
            max_shots: 3,
            shots_per_session: 1,
            countdown_ticks: 3,
            countdown_tick_ms: 1000,
            manual_grace_ms: 5000,
            hold_frames: 2,
            auto_capture: true,
            capture_timeout_ms: 2000,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=3).contains(&self.max_shots) {
            return Err(ConfigError::Invalid(format!(
                "max_shots must be 1-3, got {}",
                self.max_shots
            )));
        }
        if self.shots_per_session == 0 || self.shots_per_session > self.max_shots {
            return Err(ConfigError::Invalid(format!(
                "shots_per_session must be 1-{}, got {}",
                self.max_shots, self.shots_per_session
            )));
        }
        if self.countdown_ticks == 0 || self.countdown_tick_ms == 0 {
            return Err(ConfigError::Invalid("countdown must have at least one tick".into()));
        }
        if self.capture_timeout_ms == 0 {
            return Err(ConfigError::Invalid("capture_timeout_ms must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        assert!(SessionConfig::default().validate().is_ok());
    }

    #[test]
    fn test_shot_limits() {
        let config = SessionConfig {
            max_shots: 4,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = SessionConfig {
            shots_per_session: 3,
            max_shots: 2,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
