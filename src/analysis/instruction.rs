//! Corrective instructions shown to the user.

use serde::Serialize;
use std::fmt;

/// What the user should do next.
///
/// Directions are expressed in the mirrored preview the user sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Instruction {
    NoFace,
    MultipleFaces,
    MoveBack,
    MoveCloser,
    MoveLeft,
    MoveRight,
    MoveUp,
    MoveDown,
    ImproveLighting,
    HoldStill,
    Ready,
}

/// Instructions of the same category are near-duplicates for debouncing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstructionCategory {
    Presence,
    Crowd,
    Distance,
    Centering,
    Lighting,
    Hold,
    Ready,
}

impl Instruction {
    pub fn category(self) -> InstructionCategory {
        match self {
            Instruction::NoFace => InstructionCategory::Presence,
            Instruction::MultipleFaces => InstructionCategory::Crowd,
            Instruction::MoveBack | Instruction::MoveCloser => InstructionCategory::Distance,
            Instruction::MoveLeft
            | Instruction::MoveRight
            | Instruction::MoveUp
            | Instruction::MoveDown => InstructionCategory::Centering,
            Instruction::ImproveLighting => InstructionCategory::Lighting,
            Instruction::HoldStill => InstructionCategory::Hold,
            Instruction::Ready => InstructionCategory::Ready,
        }
    }

    /// True if replacing `self` with `other` is a semantic change.
    pub fn is_distinct_from(self, other: Instruction) -> bool {
        self.category() != other.category()
    }

    pub fn message(self) -> &'static str {
        match self {
            Instruction::NoFace => "No face detected",
            Instruction::MultipleFaces => "Only one person should be in view",
            Instruction::MoveBack => "Move back",
            Instruction::MoveCloser => "Move closer",
            Instruction::MoveLeft => "Move left",
            Instruction::MoveRight => "Move right",
            Instruction::MoveUp => "Move up",
            Instruction::MoveDown => "Move down",
            Instruction::ImproveLighting => "Improve the lighting",
            Instruction::HoldStill => "Hold still",
            Instruction::Ready => "Perfect, hold that position",
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}
