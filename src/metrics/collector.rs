//! Metrics collection and registry.

use crate::session::SessionStats;
use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Registry, TextEncoder};
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// Cumulative counters across sessions, plus the live session state.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub sessions_started: u64,
    pub sessions_succeeded: u64,
    pub sessions_cancelled: u64,
    /// Whether a session currently owns the camera.
    pub session_active: bool,
    pub frames_received: u64,
    pub frames_skipped: u64,
    pub frames_processed: u64,
    pub detector_errors: u64,
    pub confirmations: u64,
    pub captures: u64,
    pub uploads_succeeded: u64,
    pub uploads_failed: u64,
    pub startup_failures: u64,
    /// Most recent quality score.
    pub quality_score: Option<f64>,
}

impl MetricsSnapshot {
    /// Snapshot of a single session.
    pub fn from_stats(stats: &SessionStats) -> Self {
        let mut snapshot = Self::default();
        snapshot.absorb(stats);
        snapshot
    }

    /// Adds one finished session's counters to the totals.
    pub fn absorb(&mut self, stats: &SessionStats) {
        self.frames_received += stats.frames_received;
        self.frames_skipped += stats.frames_skipped;
        self.frames_processed += stats.frames_processed;
        self.detector_errors += stats.detector_errors;
        self.confirmations += stats.confirmations;
        self.captures += stats.captures;
        self.uploads_succeeded += stats.uploads_succeeded;
        self.uploads_failed += stats.uploads_failed;
        self.startup_failures += stats.startup_failures;
        if let Some(score) = stats.last_score {
            self.quality_score = Some(f64::from(score));
        }
    }
}

/// Prometheus metrics registry for capture sessions.
pub struct MetricsRegistry {
    registry: Registry,

    // Session lifecycle
    sessions_started: IntCounter,
    sessions_succeeded: IntCounter,
    sessions_cancelled: IntCounter,
    session_active: IntGauge,

    // Frame pipeline
    frames_received: IntCounter,
    frames_skipped: IntCounter,
    frames_processed: IntCounter,
    detector_errors: IntCounter,
    confirmations: IntCounter,
    quality_score: Gauge,

    // Capture and upload
    captures: IntCounter,
    uploads_succeeded: IntCounter,
    uploads_failed: IntCounter,
    startup_failures: IntCounter,
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter, MetricsError> {
    let counter = IntCounter::new(name, help)?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

/// Counters only move forward; advance to the snapshot's total.
fn advance(counter: &IntCounter, total: u64) {
    let current = counter.get();
    if total > current {
        counter.inc_by(total - current);
    }
}

impl MetricsRegistry {
    /// Creates a new metrics registry with all capture metrics registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let sessions_started = counter(
            &registry,
            "face_capture_sessions_started_total",
            "Capture sessions started",
        )?;
        let sessions_succeeded = counter(
            &registry,
            "face_capture_sessions_succeeded_total",
            "Capture sessions that ended in success",
        )?;
        let sessions_cancelled = counter(
            &registry,
            "face_capture_sessions_cancelled_total",
            "Capture sessions that were cancelled",
        )?;
        let session_active = IntGauge::new(
            "face_capture_session_active",
            "Whether a session currently owns the camera (1=yes, 0=no)",
        )?;
        registry.register(Box::new(session_active.clone()))?;

        let frames_received = counter(
            &registry,
            "face_capture_frames_received_total",
            "Frames delivered by the camera",
        )?;
        let frames_skipped = counter(
            &registry,
            "face_capture_frames_skipped_total",
            "Frames dropped before detection (busy, degenerate or not ready)",
        )?;
        let frames_processed = counter(
            &registry,
            "face_capture_frames_processed_total",
            "Detector results applied to validation and scoring",
        )?;
        let detector_errors = counter(
            &registry,
            "face_capture_detector_errors_total",
            "Per-frame detector errors treated as empty results",
        )?;
        let confirmations = counter(
            &registry,
            "face_capture_confirmations_total",
            "Times a face became confirmed",
        )?;
        let quality_score = Gauge::new(
            "face_capture_quality_score",
            "Most recent presentation quality score (0-100)",
        )?;
        registry.register(Box::new(quality_score.clone()))?;

        let captures = counter(&registry, "face_capture_captures_total", "Frames captured")?;
        let uploads_succeeded = counter(
            &registry,
            "face_capture_uploads_succeeded_total",
            "Uploads accepted by the backend",
        )?;
        let uploads_failed = counter(
            &registry,
            "face_capture_uploads_failed_total",
            "Uploads that failed validation, the operation or transport",
        )?;
        let startup_failures = counter(
            &registry,
            "face_capture_startup_failures_total",
            "Camera or detector startups that needed a retry prompt",
        )?;

        Ok(Self {
            registry,
            sessions_started,
            sessions_succeeded,
            sessions_cancelled,
            session_active,
            frames_received,
            frames_skipped,
            frames_processed,
            detector_errors,
            confirmations,
            quality_score,
            captures,
            uploads_succeeded,
            uploads_failed,
            startup_failures,
        })
    }

    /// Updates all metrics from a snapshot.
    pub fn update(&self, snapshot: &MetricsSnapshot) {
        advance(&self.sessions_started, snapshot.sessions_started);
        advance(&self.sessions_succeeded, snapshot.sessions_succeeded);
        advance(&self.sessions_cancelled, snapshot.sessions_cancelled);
        self.session_active.set(i64::from(snapshot.session_active));

        advance(&self.frames_received, snapshot.frames_received);
        advance(&self.frames_skipped, snapshot.frames_skipped);
        advance(&self.frames_processed, snapshot.frames_processed);
        advance(&self.detector_errors, snapshot.detector_errors);
        advance(&self.confirmations, snapshot.confirmations);
        if let Some(score) = snapshot.quality_score {
            self.quality_score.set(score);
        }

        advance(&self.captures, snapshot.captures);
        advance(&self.uploads_succeeded, snapshot.uploads_succeeded);
        advance(&self.uploads_failed, snapshot.uploads_failed);
        advance(&self.startup_failures, snapshot.startup_failures);
    }

    /// Returns the underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
