//! Session states and the captured-shot list.

use crate::capture::CapturedImage;
use serde::Serialize;
use std::fmt;

/// State of a capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureState {
    /// Acquiring the camera and loading the detector.
    Launch,
    /// Scanning for a face.
    Camera,
    /// A confirmed face is being held.
    Detecting,
    /// Counting down to an automatic capture.
    Countdown,
    /// Grabbing one frame.
    Capturing,
    /// Reviewing captured shots.
    Preview,
    /// Sending the chosen shot to the backend.
    Uploading,
    Success,
    /// Startup failed; waiting for the user to retry.
    Failure,
    Cancelled,
}

impl CaptureState {
    pub fn is_terminal(self) -> bool {
        matches!(self, CaptureState::Success | CaptureState::Cancelled)
    }

    /// States in which live frames are sent to the detector.
    pub fn consumes_frames(self) -> bool {
        matches!(
            self,
            CaptureState::Camera | CaptureState::Detecting | CaptureState::Countdown
        )
    }
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CaptureState::Launch => "launch",
            CaptureState::Camera => "camera",
            CaptureState::Detecting => "detecting",
            CaptureState::Countdown => "countdown",
            CaptureState::Capturing => "capturing",
            CaptureState::Preview => "preview",
            CaptureState::Uploading => "uploading",
            CaptureState::Success => "success",
            CaptureState::Failure => "failure",
            CaptureState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Shots taken in the current session, capped at a fixed maximum.
#[derive(Debug, Clone)]
pub struct CapturedFrames {
    shots: Vec<CapturedImage>,
    max: usize,
}

impl CapturedFrames {
    pub fn new(max: usize) -> Self {
        Self {
            shots: Vec::with_capacity(max),
            max,
        }
    }

    /// Appends a shot. Returns false, leaving the list unchanged, when full.
    pub fn push(&mut self, shot: CapturedImage) -> bool {
        if self.shots.len() >= self.max {
            tracing::warn!(max = self.max, "shot limit reached, capture ignored");
            return false;
        }
        self.shots.push(shot);
        true
    }

    pub fn len(&self) -> usize {
        self.shots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shots.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.shots.len() >= self.max
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn get(&self, index: usize) -> Option<&CapturedImage> {
        self.shots.get(index)
    }

    /// Index of the shot with the highest quality score.
    pub fn best(&self) -> Option<usize> {
        self.shots
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.quality_score().total_cmp(&b.quality_score()))
            .map(|(i, _)| i)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CapturedImage> {
        self.shots.iter()
    }

    pub fn clear(&mut self) {
        self.shots.clear();
    }
}
