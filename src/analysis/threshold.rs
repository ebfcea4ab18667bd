//! Per-frame acceptance thresholds for face candidates.
//!
//! A candidate passes only if every geometric and confidence check holds
//! and, when a previous valid box exists, it has not jumped too far.

use crate::capture::ConfigError;
use crate::detection::{BoundingBox, DetectedFace};
use serde::{Deserialize, Serialize};

/// Thresholds for the temporal validator.
///
/// The values are empirically tuned; all ranges are inclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationThresholds {
    /// Minimum detector confidence.
    pub min_confidence: f32,
    /// Accepted width/height range.
    pub min_aspect_ratio: f32,
    pub max_aspect_ratio: f32,
    /// Accepted normalized area range.
    pub min_area: f32,
    pub max_area: f32,
    /// Accepted range for the box center on both axes.
    pub min_center: f32,
    pub max_center: f32,
    /// Largest center movement per axis between consecutive valid frames.
    pub max_center_shift: f32,
    /// Largest area change between consecutive valid frames.
    pub max_area_shift: f32,
    /// Consecutive passing frames before a face is confirmed.
    pub required_streak: u32,
    /// Candidates kept in the validator history.
    pub history_len: usize,
}

impl Default for ValidationThresholds {
    fn default() -> Self {
        Self {
            min_confidence: 0.85,
            min_aspect_ratio: 0.6,
            max_aspect_ratio: 1.4,
            min_area: 0.025,
            max_area: 0.5,
            min_center: 0.1,
            max_center: 0.9,
            max_center_shift: 0.15,
            max_area_shift: 0.10,
            required_streak: 3,
            history_len: 5,
        }
    }
}

impl ValidationThresholds {
    /// Checks the detector output for one frame.
    ///
    /// Exactly one face must be present; it is returned when it passes.
    pub fn check_frame(
        &self,
        faces: &[DetectedFace],
        previous: Option<&BoundingBox>,
    ) -> Result<DetectedFace, ValidationRejection> {
        match faces {
            [] => Err(ValidationRejection::NoFace),
            [face] => {
                self.check(face, previous)?;
                Ok(*face)
            }
            _ => Err(ValidationRejection::MultipleFaces { count: faces.len() }),
        }
    }

    /// Checks a single candidate against the thresholds.
    pub fn check(
        &self,
        face: &DetectedFace,
        previous: Option<&BoundingBox>,
    ) -> Result<(), ValidationRejection> {
        if face.confidence() < self.min_confidence {
            return Err(ValidationRejection::LowConfidence {
                observed: face.confidence(),
                threshold: self.min_confidence,
            });
        }

        let bbox = face.bbox();
        let aspect = bbox.aspect_ratio();
        if !(self.min_aspect_ratio..=self.max_aspect_ratio).contains(&aspect) {
            return Err(ValidationRejection::AspectRatio {
                observed: aspect,
                min: self.min_aspect_ratio,
                max: self.max_aspect_ratio,
            });
        }

        let area = bbox.area();
        if !(self.min_area..=self.max_area).contains(&area) {
            return Err(ValidationRejection::Area {
                observed: area,
                min: self.min_area,
                max: self.max_area,
            });
        }

        let (cx, cy) = bbox.center();
        let centers = self.min_center..=self.max_center;
        if !centers.contains(&cx) || !centers.contains(&cy) {
            return Err(ValidationRejection::AtFrameEdge { x: cx, y: cy });
        }

        if let Some(prev) = previous {
            let (px, py) = prev.center();
            let dx = (cx - px).abs();
            let dy = (cy - py).abs();
            let darea = (area - prev.area()).abs();
            if dx > self.max_center_shift || dy > self.max_center_shift || darea > self.max_area_shift {
                return Err(ValidationRejection::Unstable { dx, dy, darea });
            }
        }

        Ok(())
    }

    /// Validates threshold consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let unit = 0.0..=1.0;
        let ordered = |name: &str, lo: f32, hi: f32| {
            if lo > hi || !unit.contains(&lo) || !unit.contains(&hi) {
                Err(ConfigError::Invalid(format!("{} range [{}, {}] is invalid", name, lo, hi)))
            } else {
                Ok(())
            }
        };

        if !unit.contains(&self.min_confidence) {
            return Err(ConfigError::Invalid(format!(
                "min_confidence must be within [0, 1], got {}",
                self.min_confidence
            )));
        }
        if self.min_aspect_ratio <= 0.0 || self.min_aspect_ratio > self.max_aspect_ratio {
            return Err(ConfigError::Invalid("aspect ratio range is invalid".into()));
        }
        ordered("area", self.min_area, self.max_area)?;
        ordered("center", self.min_center, self.max_center)?;
        if self.required_streak == 0 {
            return Err(ConfigError::Invalid("required_streak must be at least 1".into()));
        }
        if self.history_len == 0 {
            return Err(ConfigError::Invalid("history_len must be at least 1".into()));
        }
        Ok(())
    }
}

/// Why a frame did not count towards confirmation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationRejection {
    #[error("no face detected")]
    NoFace,

    #[error("{count} faces detected")]
    MultipleFaces { count: usize },

    #[error("confidence {observed:.3} below threshold {threshold:.3}")]
    LowConfidence { observed: f32, threshold: f32 },

    #[error("aspect ratio {observed:.3} outside [{min:.2}, {max:.2}]")]
    AspectRatio { observed: f32, min: f32, max: f32 },

    #[error("face area {observed:.3} outside [{min:.3}, {max:.3}]")]
    Area { observed: f32, min: f32, max: f32 },

    #[error("face center ({x:.3}, {y:.3}) too close to the frame edge")]
    AtFrameEdge { x: f32, y: f32 },

    #[error("face moved too much between frames (dx {dx:.3}, dy {dy:.3}, darea {darea:.3})")]
    Unstable { dx: f32, dy: f32, darea: f32 },
}

impl ValidationRejection {
    /// Corrective message for the user.
    pub fn user_message(&self) -> &'static str {
        match self {
            ValidationRejection::NoFace => "No face detected. Look at the camera.",
            ValidationRejection::MultipleFaces { .. } => {
                "More than one face detected. Make sure only you are in view."
            }
            ValidationRejection::LowConfidence { .. } => "Face not clear. Improve the lighting.",
            ValidationRejection::AspectRatio { .. } => "Face the camera directly.",
            ValidationRejection::Area { .. } => "Adjust your distance from the camera.",
            ValidationRejection::AtFrameEdge { .. } => "Move your face to the center of the frame.",
            ValidationRejection::Unstable { .. } => "Hold still.",
        }
    }
}
