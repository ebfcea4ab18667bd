//! Presentation-quality scoring.
//!
//! Face geometry is smoothed with an exponential moving average before it is
//! scored, so a single jittery detection does not swing the score. Updates
//! are throttled and instructions are debounced with [`Cooldown`] gates.

use super::instruction::Instruction;
use crate::capture::ConfigError;
use crate::detection::DetectedFace;
use crate::timing::Cooldown;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Scoring constants.
///
/// The table values are empirically tuned and kept as named configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// EMA smoothing factor in (0, 1].
    pub ema_alpha: f32,
    pub base_score: f32,

    pub too_close_area: f32,
    pub too_close_penalty: f32,
    pub too_far_area: f32,
    pub too_far_penalty: f32,
    pub ideal_area_min: f32,
    pub ideal_area_max: f32,
    pub ideal_area_bonus: f32,
    pub in_range_area_bonus: f32,

    /// Offset from center (either axis) that counts as off-center.
    pub off_center_offset: f32,
    pub off_center_penalty: f32,
    /// Offset below which (both axes) the face counts as centered.
    pub centered_offset: f32,
    pub centered_bonus: f32,
    pub partial_center_bonus: f32,

    pub high_confidence: f32,
    pub high_confidence_bonus: f32,
    pub good_confidence: f32,
    pub good_confidence_bonus: f32,
    pub low_confidence: f32,
    pub low_confidence_penalty: f32,

    /// Lowest score in the good band.
    pub good_band: f32,
    /// Lowest score in the excellent band.
    pub excellent_band: f32,

    /// Raw scores kept for diagnostic averaging.
    pub score_window: usize,
    /// Minimum interval between published updates.
    pub update_interval_ms: u64,
    /// Minimum interval between instruction changes.
    pub instruction_cooldown_ms: u64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            ema_alpha: 0.25,
            base_score: 50.0,
            too_close_area: 0.32,
            too_close_penalty: 30.0,
            too_far_area: 0.055,
            too_far_penalty: 20.0,
            ideal_area_min: 0.11,
            ideal_area_max: 0.26,
            ideal_area_bonus: 30.0,
            in_range_area_bonus: 15.0,
            off_center_offset: 0.25,
            off_center_penalty: 20.0,
            centered_offset: 0.17,
            centered_bonus: 25.0,
            partial_center_bonus: 10.0,
            high_confidence: 0.9,
            high_confidence_bonus: 25.0,
            good_confidence: 0.75,
            good_confidence_bonus: 15.0,
            low_confidence: 0.6,
            low_confidence_penalty: 25.0,
            good_band: 85.0,
            excellent_band: 95.0,
            score_window: 8,
            update_interval_ms: 200,
            instruction_cooldown_ms: 800,
        }
    }
}

impl ScoringConfig {
    /// Scores smoothed geometry and the current confidence, clamped to [0, 100].
    pub fn score(&self, center: (f32, f32), area: f32, confidence: f32) -> f32 {
        let mut score = self.base_score;

        score += if area > self.too_close_area {
            -self.too_close_penalty
        } else if area < self.too_far_area {
            -self.too_far_penalty
        } else if (self.ideal_area_min..=self.ideal_area_max).contains(&area) {
            self.ideal_area_bonus
        } else {
            self.in_range_area_bonus
        };

        let dx = (center.0 - 0.5).abs();
        let dy = (center.1 - 0.5).abs();
        score += if dx > self.off_center_offset || dy > self.off_center_offset {
            -self.off_center_penalty
        } else if dx < self.centered_offset && dy < self.centered_offset {
            self.centered_bonus
        } else {
            self.partial_center_bonus
        };

        score += if confidence > self.high_confidence {
            self.high_confidence_bonus
        } else if confidence > self.good_confidence {
            self.good_confidence_bonus
        } else if confidence < self.low_confidence {
            -self.low_confidence_penalty
        } else {
            0.0
        };

        if score.is_nan() {
            0.0
        } else {
            score.clamp(0.0, 100.0)
        }
    }

    /// Classifies a score.
    pub fn band(&self, score: f32) -> QualityBand {
        if score >= self.excellent_band {
            QualityBand::Excellent
        } else if score >= self.good_band {
            QualityBand::Good
        } else {
            QualityBand::Poor
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.ema_alpha > 0.0 && self.ema_alpha <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "ema_alpha must be in (0, 1], got {}",
                self.ema_alpha
            )));
        }
        if self.too_far_area >= self.too_close_area || self.ideal_area_min > self.ideal_area_max {
            return Err(ConfigError::Invalid("area bands overlap".into()));
        }
        if self.centered_offset > self.off_center_offset {
            return Err(ConfigError::Invalid("centering bands overlap".into()));
        }
        if !(0.0..=100.0).contains(&self.good_band) || self.good_band > self.excellent_band {
            return Err(ConfigError::Invalid("quality bands are invalid".into()));
        }
        if self.score_window == 0 {
            return Err(ConfigError::Invalid("score_window must be at least 1".into()));
        }
        Ok(())
    }
}

/// Coarse score classification used for gating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityBand {
    Poor,
    Good,
    Excellent,
}

/// One step of the exponential moving average.
pub fn ema(smoothed: f32, raw: f32, alpha: f32) -> f32 {
    smoothed * (1.0 - alpha) + raw * alpha
}

/// Scorer state after a frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QualitySample {
    /// Smoothed box center, `None` until a face has been seen.
    pub smoothed_center: Option<(f32, f32)>,
    pub smoothed_area: Option<f32>,
    pub score: f32,
    pub band: QualityBand,
    /// The displayed instruction after debouncing.
    pub instruction: Instruction,
}

/// Result of scoring one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreUpdate {
    pub sample: QualitySample,
    /// The throttle allowed this update to be shown.
    pub publish: bool,
    /// The displayed instruction changed on this frame.
    pub instruction_changed: bool,
}

#[derive(Debug, Clone, Copy)]
struct Smoothed {
    cx: f32,
    cy: f32,
    area: f32,
}

/// EMA-smoothed quality scorer.
pub struct QualityScorer {
    config: ScoringConfig,
    smoothed: Option<Smoothed>,
    window: VecDeque<f32>,
    displayed: Option<Instruction>,
    last_sample: Option<QualitySample>,
    update_gate: Cooldown,
    instruction_gate: Cooldown,
}

impl QualityScorer {
    pub fn new(config: ScoringConfig) -> Self {
        let update_gate = Cooldown::new(Duration::from_millis(config.update_interval_ms));
        let instruction_gate = Cooldown::new(Duration::from_millis(config.instruction_cooldown_ms));
        Self {
            window: VecDeque::with_capacity(config.score_window),
            config,
            smoothed: None,
            displayed: None,
            last_sample: None,
            update_gate,
            instruction_gate,
        }
    }

    /// Scores the detector output for one frame.
    pub fn update(&mut self, faces: &[DetectedFace], now: Instant) -> ScoreUpdate {
        let (score, candidate) = match faces {
            [] => (0.0, Instruction::NoFace),
            // A malformed box must not reach the smoothed geometry.
            [face] if !face.bbox().is_finite() => (0.0, Instruction::NoFace),
            [face] => {
                let smoothed = self.smooth(face);
                let center = (smoothed.cx, smoothed.cy);
                let score = self.config.score(center, smoothed.area, face.confidence());
                let candidate = self.choose_instruction(center, smoothed.area, face.confidence(), score);
                (score, candidate)
            }
            _ => (0.0, Instruction::MultipleFaces),
        };

        self.push_score(score);
        let instruction_changed = self.debounce(candidate, now);

        let sample = QualitySample {
            smoothed_center: self.smoothed.map(|s| (s.cx, s.cy)),
            smoothed_area: self.smoothed.map(|s| s.area),
            score,
            band: self.config.band(score),
            instruction: self.displayed.unwrap_or(candidate),
        };
        self.last_sample = Some(sample);

        let publish = self.update_gate.try_fire(now);
        if publish {
            tracing::trace!(score, band = ?sample.band, instruction = %sample.instruction, "quality update");
        }

        ScoreUpdate {
            sample,
            publish,
            instruction_changed,
        }
    }

    fn smooth(&mut self, face: &DetectedFace) -> Smoothed {
        let (cx, cy) = face.bbox().center();
        let area = face.bbox().area();
        let alpha = self.config.ema_alpha;

        let next = match self.smoothed {
            None => Smoothed { cx, cy, area },
            Some(prev) => Smoothed {
                cx: ema(prev.cx, cx, alpha),
                cy: ema(prev.cy, cy, alpha),
                area: ema(prev.area, area, alpha),
            },
        };
        self.smoothed = Some(next);
        next
    }

    fn choose_instruction(&self, center: (f32, f32), area: f32, confidence: f32, score: f32) -> Instruction {
        if area > self.config.too_close_area {
            return Instruction::MoveBack;
        }
        if area < self.config.too_far_area {
            return Instruction::MoveCloser;
        }

        // Native coordinates; the preview is mirrored horizontally.
        let dx = center.0 - 0.5;
        let dy = center.1 - 0.5;
        if dx.abs().max(dy.abs()) >= self.config.centered_offset {
            return if dx.abs() >= dy.abs() {
                if dx > 0.0 {
                    Instruction::MoveRight
                } else {
                    Instruction::MoveLeft
                }
            } else if dy > 0.0 {
                Instruction::MoveUp
            } else {
                Instruction::MoveDown
            };
        }

        if confidence < self.config.good_confidence {
            return Instruction::ImproveLighting;
        }

        match self.config.band(score) {
            QualityBand::Poor => Instruction::HoldStill,
            _ => Instruction::Ready,
        }
    }

    fn debounce(&mut self, candidate: Instruction, now: Instant) -> bool {
        match self.displayed {
            None => {
                self.displayed = Some(candidate);
                self.instruction_gate.arm(now);
                true
            }
            Some(current) if !current.is_distinct_from(candidate) => false,
            Some(_) => {
                if self.instruction_gate.try_fire(now) {
                    self.displayed = Some(candidate);
                    true
                } else {
                    false
                }
            }
        }
    }

    fn push_score(&mut self, score: f32) {
        if self.window.len() == self.config.score_window.max(1) {
            self.window.pop_front();
        }
        self.window.push_back(score);
    }

    /// Mean of the recent raw scores, for diagnostics only.
    pub fn average_score(&self) -> Option<f32> {
        if self.window.is_empty() {
            None
        } else {
            Some(self.window.iter().sum::<f32>() / self.window.len() as f32)
        }
    }

    pub fn last_sample(&self) -> Option<&QualitySample> {
        self.last_sample.as_ref()
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Cancels the throttle and debounce gates.
    pub fn cancel_timers(&mut self) {
        self.update_gate.cancel();
        self.instruction_gate.cancel();
    }

    /// Clears smoothing and instruction state.
    pub fn reset(&mut self) {
        self.smoothed = None;
        self.window.clear();
        self.displayed = None;
        self.last_sample = None;
        self.cancel_timers();
    }
}

impl Default for QualityScorer {
    fn default() -> Self {
        Self::new(ScoringConfig::default())
    }
}
