//! Camera constraints and configuration file loading.
//!
//! Constraints describe what the session asks the camera for. When the
//! device cannot satisfy them, acquisition retries once with
//! [`CaptureConstraints::relaxed`].

use crate::analysis::{ScoringConfig, ValidationThresholds};
use crate::backend::BackendConfig;
use crate::detection::DetectorConfig;
use crate::capture::Frame;
use crate::session::SessionConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Which camera the session prefers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Facing {
    /// Front (selfie) camera.
    User,
    /// Rear camera.
    Environment,
    /// Whatever the device offers.
    Any,
}

/// Constraints requested from the camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConstraints {
    /// Camera device index, `None` for the platform default.
    pub device_id: Option<u32>,
    /// Preferred frame width in pixels.
    pub width: Option<u32>,
    /// Preferred frame height in pixels.
    pub height: Option<u32>,
    /// Preferred frames per second.
    pub frame_rate: Option<u32>,
    /// Preferred camera facing.
    pub facing: Facing,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            device_id: None,
            width: Some(1280),
            height: Some(720),
            frame_rate: Some(30),
            facing: Facing::User,
        }
    }
}

impl CaptureConstraints {
    /// Creates constraints with the specified dimensions.
    pub fn with_dimensions(width: u32, height: u32) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
            ..Default::default()
        }
    }

    /// Basic constraints used for the single fallback attempt.
    ///
    /// Only the device selection survives; resolution, frame rate and
    /// facing are left to the device.
    pub fn relaxed(&self) -> Self {
        Self {
            device_id: self.device_id,
            width: None,
            height: None,
            frame_rate: None,
            facing: Facing::Any,
        }
    }

    /// True if these constraints are already the relaxed form.
    pub fn is_basic(&self) -> bool {
        self.width.is_none()
            && self.height.is_none()
            && self.frame_rate.is_none()
            && self.facing == Facing::Any
    }

    /// Validates the constraint values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if matches!(self.width, Some(0)) || matches!(self.height, Some(0)) {
            return Err(ConfigError::InvalidDimensions);
        }
        if let Some(fps) = self.frame_rate {
            if fps == 0 || fps > 120 {
                return Err(ConfigError::InvalidFrameRate);
            }
        }
        Ok(())
    }
}

/// Camera section of the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Constraints requested on acquisition.
    pub constraints: CaptureConstraints,
    /// JPEG quality of captured images (1-100).
    pub jpeg_quality: u8,
    /// Whether the on-screen preview is mirrored.
    pub mirror_preview: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            constraints: CaptureConstraints::default(),
            jpeg_quality: 92,
            mirror_preview: true,
        }
    }
}

impl CaptureConfig {
    /// The frame as shown on screen.
    pub fn preview(&self, frame: Frame) -> Frame {
        if self.mirror_preview {
            frame.mirrored()
        } else {
            frame
        }
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.constraints.validate()?;
        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err(ConfigError::Invalid(format!(
                "jpeg_quality must be 1-100, got {}",
                self.jpeg_quality
            )));
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid frame dimensions")]
    InvalidDimensions,
    #[error("invalid frame rate (must be 1-120 fps)")]
    InvalidFrameRate,
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Full configuration file format.
///
/// Every section is optional; missing sections take the tuned defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub validation: ValidationThresholds,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub backend: BackendConfig,
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: FileConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.capture.validate()?;
        self.detector.validate()?;
        self.validation.validate()?;
        self.scoring.validate()?;
        self.session.validate()?;
        Ok(())
    }
}
