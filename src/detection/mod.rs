//! Face detection through an external oracle.
//!
//! The oracle is treated as an untrusted, fallible service. The
//! [`DetectorAdapter`] is the only component that talks to it.

mod adapter;
mod face;
mod oracle;

pub use adapter::{
    Detection, DetectorAdapter, DetectorInitError, DetectorStatus, PendingDetection, SkipReason,
};
pub use face::{BoundingBox, DetectedFace};
pub use oracle::{DetectionOracle, OracleError, ScriptedOracle};

use crate::capture::ConfigError;
use serde::{Deserialize, Serialize};

/// Detector section of the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Initialization attempts before giving up.
    pub max_init_attempts: u32,
    /// Fixed delay between initialization attempts.
    pub init_backoff_ms: u64,
    /// Upper bound on a single initialization attempt.
    pub init_timeout_ms: u64,
    /// Frames wider or taller than this are skipped.
    pub max_frame_dimension: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            max_init_attempts: 3,
            init_backoff_ms: 1000,
            init_timeout_ms: 15_000,
            max_frame_dimension: 4096,
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_init_attempts == 0 || self.max_init_attempts > 3 {
            return Err(ConfigError::Invalid(format!(
                "max_init_attempts must be 1-3, got {}",
                self.max_init_attempts
            )));
        }
        if self.init_timeout_ms == 0 {
            return Err(ConfigError::Invalid("init_timeout_ms must be positive".into()));
        }
        if self.max_frame_dimension == 0 {
            return Err(ConfigError::InvalidDimensions);
        }
        Ok(())
    }
}
