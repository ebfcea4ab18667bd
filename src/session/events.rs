//! Messages between a session and the embedding application.

use super::state::CaptureState;
use super::upload::UploadProgress;
use crate::analysis::{Instruction, QualitySample};
use crate::detection::DetectorStatus;

/// User actions sent to a running session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    /// Abort a running countdown and return to scanning.
    CancelCountdown,
    /// Capture now, bypassing the detection gate.
    ManualCapture,
    /// Choose which shot to upload.
    SelectShot(usize),
    /// Discard all shots and scan again.
    Retake,
    /// Upload the selected shot.
    Confirm,
    /// Re-run startup after a failure.
    Retry,
    /// End the session.
    Close,
}

/// Notifications emitted by a session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged { from: CaptureState, to: CaptureState },
    DetectorStatus(DetectorStatus),
    /// Throttled score update.
    Quality(QualitySample),
    /// The displayed instruction changed.
    Instruction(Instruction),
    /// A corrective or dismissible message.
    Message(String),
    /// Brief visual cue when a held face is lost.
    Shake,
    ManualCaptureAvailable,
    /// Ticks left in the countdown.
    CountdownTick(u32),
    /// "captured X of N".
    ShotCaptured { index: usize, total: usize },
    UploadProgress(UploadProgress),
    /// Startup failed; `Retry` re-runs it.
    RetryPrompt(String),
}
