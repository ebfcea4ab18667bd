//! Temporal face validation.
//!
//! A face is confirmed only after several consecutive passing frames.
//! A single failing frame resets the streak and the reference box.

use super::threshold::{ValidationRejection, ValidationThresholds};
use crate::detection::{BoundingBox, DetectedFace};
use std::collections::VecDeque;

/// Streak state carried between frames.
#[derive(Debug, Clone, Default)]
pub struct ValidationState {
    /// Consecutive passing frames.
    pub consecutive_valid: u32,
    /// Box of the most recent passing frame.
    pub last_valid_box: Option<BoundingBox>,
    /// Most recent candidates since the last reset.
    pub history: VecDeque<DetectedFace>,
}

/// Result of observing one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationOutcome {
    /// The frame passed every check.
    pub passed: bool,
    /// The streak has reached the required length.
    pub confirmed: bool,
    /// Streak length after this frame.
    pub consecutive_valid: u32,
    /// Why the frame failed, if it did.
    pub rejection: Option<ValidationRejection>,
}

/// Confirms a face over consecutive frames.
pub struct TemporalValidator {
    thresholds: ValidationThresholds,
    state: ValidationState,
    total_frames: u64,
    confirmations: u64,
}

impl TemporalValidator {
    pub fn new(thresholds: ValidationThresholds) -> Self {
        Self {
            thresholds,
            state: ValidationState::default(),
            total_frames: 0,
            confirmations: 0,
        }
    }

    /// Feeds the detector output for one frame.
    pub fn observe(&mut self, faces: &[DetectedFace]) -> ValidationOutcome {
        self.total_frames += 1;

        let history_len = self.thresholds.history_len.max(1);
        for face in faces {
            if self.state.history.len() == history_len {
                self.state.history.pop_front();
            }
            self.state.history.push_back(*face);
        }

        match self
            .thresholds
            .check_frame(faces, self.state.last_valid_box.as_ref())
        {
            Ok(face) => {
                let was_confirmed = self.is_confirmed();
                self.state.consecutive_valid = self.state.consecutive_valid.saturating_add(1);
                self.state.last_valid_box = Some(*face.bbox());

                let confirmed = self.is_confirmed();
                if confirmed && !was_confirmed {
                    self.confirmations += 1;
                    tracing::info!(
                        streak = self.state.consecutive_valid,
                        confidence = face.confidence(),
                        "Face confirmed"
                    );
                }

                ValidationOutcome {
                    passed: true,
                    confirmed,
                    consecutive_valid: self.state.consecutive_valid,
                    rejection: None,
                }
            }
            Err(rejection) => {
                if self.is_confirmed() {
                    tracing::debug!(reason = %rejection, "Face confirmation lost");
                }
                self.state = ValidationState::default();

                ValidationOutcome {
                    passed: false,
                    confirmed: false,
                    consecutive_valid: 0,
                    rejection: Some(rejection),
                }
            }
        }
    }

    /// True once the streak reaches the required length.
    pub fn is_confirmed(&self) -> bool {
        self.state.consecutive_valid >= self.thresholds.required_streak
    }

    pub fn state(&self) -> &ValidationState {
        &self.state
    }

    pub fn thresholds(&self) -> &ValidationThresholds {
        &self.thresholds
    }

    /// Frames observed since creation.
    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    /// Times a face became confirmed since creation.
    pub fn confirmations(&self) -> u64 {
        self.confirmations
    }

    /// Clears the streak, e.g. on session restart.
    pub fn reset(&mut self) {
        self.state = ValidationState::default();
        tracing::debug!("Validator reset");
    }
}

impl Default for TemporalValidator {
    fn default() -> Self {
        Self::new(ValidationThresholds::default())
    }
}
