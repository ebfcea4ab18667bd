//! Guarded access to the detection oracle.
//!
//! The adapter enforces the rules the pipeline relies on:
//! - at most one oracle call in flight; frames arriving meanwhile are dropped,
//! - degenerate frames never reach the oracle,
//! - per-frame oracle errors are logged and reported as "no faces",
//! - initialization is retried a bounded number of times with fixed backoff.

use super::{DetectedFace, DetectionOracle, DetectorConfig, OracleError};
use crate::capture::Frame;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

/// Lifecycle of the underlying detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorStatus {
    Idle,
    Loading { attempt: u32 },
    Ready,
    Failed { attempts: u32 },
    Closed,
}

/// Initialization failure after all retries.
#[derive(Debug, Clone, Error)]
pub enum DetectorInitError {
    #[error("detector failed to initialize after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: OracleError },
    #[error("detector closed during initialization")]
    Closed,
}

impl DetectorInitError {
    pub fn user_message(&self) -> &'static str {
        "Face detection could not be started. Check your connection and try again."
    }
}

/// Why a frame was not sent to the oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// A previous call is still pending.
    Busy,
    /// Zero or oversized dimensions.
    DegenerateFrame,
    /// Detector not initialized yet.
    NotReady,
    /// Adapter closed.
    Closed,
}

/// Result of submitting one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
    /// Faces found in the frame. Empty on no detection or oracle error.
    Faces(Vec<DetectedFace>),
    /// The frame was dropped without calling the oracle.
    Skipped(SkipReason),
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Wraps a [`DetectionOracle`] with the pipeline's safety rules.
pub struct DetectorAdapter<O: DetectionOracle> {
    oracle: O,
    config: DetectorConfig,
    status: watch::Sender<DetectorStatus>,
    in_flight: AtomicBool,
    closed: AtomicBool,
    runtime_errors: AtomicU64,
}

impl<O: DetectionOracle> DetectorAdapter<O> {
    pub fn new(oracle: O, config: DetectorConfig) -> Self {
        let (status, _) = watch::channel(DetectorStatus::Idle);
        Self {
            oracle,
            config,
            status,
            in_flight: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            runtime_errors: AtomicU64::new(0),
        }
    }

    /// Subscribes to status transitions.
    pub fn status(&self) -> watch::Receiver<DetectorStatus> {
        self.status.subscribe()
    }

    pub fn current_status(&self) -> DetectorStatus {
        *self.status.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.current_status() == DetectorStatus::Ready
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// True while an oracle call is pending.
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Number of per-frame oracle errors swallowed so far.
    pub fn runtime_errors(&self) -> u64 {
        self.runtime_errors.load(Ordering::Relaxed)
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    fn set_status(&self, status: DetectorStatus) {
        self.status.send_replace(status);
    }

    /// Loads the detector, retrying with a fixed backoff.
    ///
    /// Dropping the returned future cancels any pending backoff.
    pub async fn initialize(&self) -> Result<(), DetectorInitError> {
        let attempts = self.config.max_init_attempts.max(1);
        let backoff = Duration::from_millis(self.config.init_backoff_ms);
        let timeout = Duration::from_millis(self.config.init_timeout_ms);
        let mut last = OracleError::Timeout;

        for attempt in 1..=attempts {
            if self.is_closed() {
                return Err(DetectorInitError::Closed);
            }
            self.set_status(DetectorStatus::Loading { attempt });

            match tokio::time::timeout(timeout, self.oracle.initialize()).await {
                Ok(Ok(())) => {
                    if self.is_closed() {
                        return Err(DetectorInitError::Closed);
                    }
                    self.set_status(DetectorStatus::Ready);
                    tracing::info!(attempt, "detector ready");
                    return Ok(());
                }
                Ok(Err(e)) => last = e,
                Err(_) => last = OracleError::Timeout,
            }

            tracing::warn!(attempt, max = attempts, error = %last, "detector initialization failed");
            if attempt < attempts {
                tokio::time::sleep(backoff).await;
            }
        }

        self.set_status(DetectorStatus::Failed { attempts });
        Err(DetectorInitError::Exhausted { attempts, last })
    }

    /// Claims the in-flight slot for `frame`.
    ///
    /// The checks run synchronously, so the caller learns immediately
    /// whether the frame was accepted. The returned [`PendingDetection`]
    /// performs the oracle call and frees the slot when it completes or
    /// is dropped.
    pub fn try_submit(self: &Arc<Self>, frame: Frame) -> Result<PendingDetection<O>, SkipReason> {
        if self.is_closed() {
            return Err(SkipReason::Closed);
        }
        if !self.is_ready() {
            return Err(SkipReason::NotReady);
        }
        if frame.is_degenerate(self.config.max_frame_dimension) {
            tracing::debug!(
                width = frame.width(),
                height = frame.height(),
                "skipping degenerate frame"
            );
            return Err(SkipReason::DegenerateFrame);
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SkipReason::Busy);
        }

        Ok(PendingDetection {
            adapter: Arc::clone(self),
            frame,
        })
    }

    /// Submits a frame and waits for the result.
    pub async fn send(self: &Arc<Self>, frame: Frame) -> Detection {
        match self.try_submit(frame) {
            Ok(pending) => pending.run().await,
            Err(reason) => Detection::Skipped(reason),
        }
    }

    /// Closes the oracle. Idempotent.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.oracle.close();
            self.set_status(DetectorStatus::Closed);
            tracing::info!("detector closed");
        }
    }
}

/// An accepted frame waiting for the oracle.
pub struct PendingDetection<O: DetectionOracle> {
    adapter: Arc<DetectorAdapter<O>>,
    frame: Frame,
}

impl<O: DetectionOracle> PendingDetection<O> {
    /// Sequence number of the submitted frame.
    pub fn sequence(&self) -> u64 {
        self.frame.sequence()
    }

    /// Calls the oracle. Errors are logged and reported as no faces, and
    /// faces with non-finite boxes are dropped.
    pub async fn run(self) -> Detection {
        let adapter = &self.adapter;
        let _slot = InFlight(&adapter.in_flight);

        let result = adapter.oracle.send(&self.frame).await;
        if adapter.is_closed() {
            return Detection::Skipped(SkipReason::Closed);
        }

        match result {
            Ok(mut faces) => {
                let reported = faces.len();
                faces.retain(|f| f.bbox().is_finite());
                if faces.len() < reported {
                    tracing::warn!(
                        sequence = self.frame.sequence(),
                        dropped = reported - faces.len(),
                        "dropping faces with non-finite boxes"
                    );
                }
                Detection::Faces(faces)
            }
            Err(e) => {
                adapter.runtime_errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(sequence = self.frame.sequence(), error = %e, "detection failed, treating frame as empty");
                Detection::Faces(Vec::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{BoundingBox, ScriptedOracle};

    fn face() -> DetectedFace {
        DetectedFace::new(BoundingBox::centered(0.5, 0.5, 0.4, 0.45), 0.95)
    }

    fn frame(seq: u64) -> Frame {
        Frame::filled(64, 48, [100, 100, 100], seq)
    }

    async fn ready_adapter(oracle: ScriptedOracle) -> Arc<DetectorAdapter<ScriptedOracle>> {
        let adapter = Arc::new(DetectorAdapter::new(oracle, DetectorConfig::default()));
        adapter.initialize().await.unwrap();
        adapter
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_retries_then_succeeds() {
        let oracle = ScriptedOracle::constant(vec![face()]).with_init_failures(2);
        let adapter = DetectorAdapter::new(oracle.clone(), DetectorConfig::default());
        let status = adapter.status();

        adapter.initialize().await.unwrap();
        assert_eq!(oracle.init_calls(), 3);
        assert_eq!(*status.borrow(), DetectorStatus::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_gives_up_after_bounded_attempts() {
        let oracle = ScriptedOracle::constant(vec![]).with_init_failures(10);
        let adapter = DetectorAdapter::new(oracle.clone(), DetectorConfig::default());

        let err = adapter.initialize().await.unwrap_err();
        assert!(matches!(err, DetectorInitError::Exhausted { attempts: 3, .. }));
        assert_eq!(oracle.init_calls(), 3);
        assert_eq!(
            adapter.current_status(),
            DetectorStatus::Failed { attempts: 3 }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_uses_fixed_backoff() {
        let oracle = ScriptedOracle::constant(vec![]).with_init_failures(2);
        let adapter = DetectorAdapter::new(oracle, DetectorConfig::default());

        let start = tokio::time::Instant::now();
        adapter.initialize().await.unwrap();
        let backoff = Duration::from_millis(DetectorConfig::default().init_backoff_ms);
        assert_eq!(start.elapsed(), backoff * 2);
    }

    #[tokio::test]
    async fn test_send_before_ready_is_skipped() {
        let adapter = Arc::new(DetectorAdapter::new(
            ScriptedOracle::constant(vec![face()]),
            DetectorConfig::default(),
        ));
        assert_eq!(
            adapter.send(frame(1)).await,
            Detection::Skipped(SkipReason::NotReady)
        );
    }

    #[tokio::test]
    async fn test_degenerate_frame_never_reaches_oracle() {
        let oracle = ScriptedOracle::constant(vec![face()]);
        let adapter = ready_adapter(oracle.clone()).await;

        let empty = Frame::new(Vec::new(), 0, 0, 1);
        assert_eq!(
            adapter.send(empty).await,
            Detection::Skipped(SkipReason::DegenerateFrame)
        );

        let huge = Frame::new(vec![0; 3], 100_000, 1, 2);
        assert_eq!(
            adapter.send(huge).await,
            Detection::Skipped(SkipReason::DegenerateFrame)
        );
        assert_eq!(oracle.send_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_frame_dropped_while_pending() {
        let oracle = ScriptedOracle::constant(vec![face()]).with_latency(Duration::from_millis(100));
        let adapter = ready_adapter(oracle.clone()).await;

        let first = adapter.try_submit(frame(1)).unwrap();
        assert!(adapter.is_busy());
        assert!(matches!(adapter.try_submit(frame(2)), Err(SkipReason::Busy)));

        assert_eq!(first.run().await, Detection::Faces(vec![face()]));
        assert!(!adapter.is_busy());
        assert_eq!(oracle.send_calls(), 1);

        // Slot is free again
        assert!(adapter.try_submit(frame(3)).is_ok());
    }

    #[tokio::test]
    async fn test_dropping_pending_frees_slot() {
        let adapter = ready_adapter(ScriptedOracle::constant(vec![face()])).await;
        let pending = adapter.try_submit(frame(1)).unwrap();
        drop(pending);
        assert!(!adapter.is_busy());
    }

    #[tokio::test]
    async fn test_oracle_error_becomes_empty_detection() {
        let oracle = ScriptedOracle::script(vec![
            Err(OracleError::Runtime("gpu lost".into())),
            Ok(vec![face()]),
        ]);
        let adapter = ready_adapter(oracle).await;

        assert_eq!(adapter.send(frame(1)).await, Detection::Faces(vec![]));
        assert_eq!(adapter.runtime_errors(), 1);
        assert_eq!(adapter.send(frame(2)).await, Detection::Faces(vec![face()]));
    }

    #[tokio::test]
    async fn test_non_finite_boxes_are_dropped() {
        let broken = DetectedFace::new(BoundingBox::new(f32::NAN, f32::NAN, f32::NAN, f32::NAN), 0.95);
        let oracle = ScriptedOracle::script(vec![Ok(vec![broken]), Ok(vec![broken, face()])]);
        let adapter = ready_adapter(oracle).await;

        assert_eq!(adapter.send(frame(1)).await, Detection::Faces(vec![]));
        assert_eq!(adapter.send(frame(2)).await, Detection::Faces(vec![face()]));
        assert_eq!(adapter.runtime_errors(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_result_after_close_is_discarded() {
        let oracle = ScriptedOracle::constant(vec![face()]).with_latency(Duration::from_millis(50));
        let adapter = ready_adapter(oracle.clone()).await;

        let pending = adapter.try_submit(frame(1)).unwrap();
        let task = tokio::spawn(pending.run());
        tokio::task::yield_now().await;
        adapter.close();

        assert_eq!(task.await.unwrap(), Detection::Skipped(SkipReason::Closed));
        assert!(oracle.is_closed());
        assert_eq!(adapter.current_status(), DetectorStatus::Closed);
    }
}
