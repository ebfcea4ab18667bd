//! Per-session counters.

use serde::Serialize;

/// Counters collected over one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionStats {
    /// Frames delivered by the camera.
    pub frames_received: u64,
    /// Frames dropped before reaching the detector.
    pub frames_skipped: u64,
    /// Detector results applied to the pipeline.
    pub frames_processed: u64,
    /// Per-frame detector errors, reported as empty results.
    pub detector_errors: u64,
    /// Times a face became confirmed.
    pub confirmations: u64,
    /// Frames returned to scanning by a failed validation.
    pub detections_lost: u64,
    pub captures: u64,
    pub upload_attempts: u64,
    pub uploads_succeeded: u64,
    pub uploads_failed: u64,
    /// Startup attempts that ended in `Failure`.
    pub startup_failures: u64,
    /// The camera was opened with relaxed constraints.
    pub camera_relaxed: bool,
    /// Most recent quality score.
    pub last_score: Option<f32>,
}
