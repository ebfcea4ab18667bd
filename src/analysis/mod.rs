//! Face validation and quality scoring.
//!
//! The validator decides whether a face is stable enough to capture; the
//! scorer grades how well it is presented and tells the user what to fix.
//! Both consume the same per-frame detector output.

mod instruction;
mod scorer;
mod threshold;
mod validator;

pub use instruction::{Instruction, InstructionCategory};
pub use scorer::{ema, QualityBand, QualitySample, QualityScorer, ScoreUpdate, ScoringConfig};
pub use threshold::{ValidationRejection, ValidationThresholds};
pub use validator::{TemporalValidator, ValidationOutcome, ValidationState};
