//! The external face-detection capability.
//!
//! The oracle is untrusted: every call may fail, hang or return garbage.
//! It is only ever called through a [`DetectorAdapter`](super::DetectorAdapter).

use super::DetectedFace;
use crate::capture::Frame;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

/// Errors reported by a detection oracle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    #[error("detector failed to load: {0}")]
    Load(String),
    #[error("detector timed out")]
    Timeout,
    #[error("detection failed: {0}")]
    Runtime(String),
    #[error("detector closed")]
    Closed,
}

/// Face detection capability consumed by the pipeline.
#[async_trait]
pub trait DetectionOracle: Send + Sync + 'static {
    /// Loads and primes the detector.
    async fn initialize(&self) -> Result<(), OracleError>;

    /// Detects faces in one frame.
    async fn send(&self, frame: &Frame) -> Result<Vec<DetectedFace>, OracleError>;

    /// Releases the detector. Further calls may fail.
    fn close(&self);
}

type Step = Result<Vec<DetectedFace>, OracleError>;

struct ScriptState {
    steps: Mutex<Vec<Step>>,
    latency_ms: AtomicU64,
    init_failures: AtomicU32,
    init_calls: AtomicU32,
    send_calls: AtomicU64,
    closed: AtomicBool,
}

/// Oracle replaying a fixed script of per-call results.
///
/// Call `n` returns step `n`; once the script is exhausted the last step
/// repeats. Clones share state, so a test can keep a handle after moving
/// the oracle into a session.
#[derive(Clone)]
pub struct ScriptedOracle {
    state: Arc<ScriptState>,
}

impl ScriptedOracle {
    fn from_steps(steps: Vec<Step>) -> Self {
        Self {
            state: Arc::new(ScriptState {
                steps: Mutex::new(steps),
                latency_ms: AtomicU64::new(0),
                init_failures: AtomicU32::new(0),
                init_calls: AtomicU32::new(0),
                send_calls: AtomicU64::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Returns the same faces for every frame.
    pub fn constant(faces: Vec<DetectedFace>) -> Self {
        Self::from_steps(vec![Ok(faces)])
    }

    /// Replays `frames` in order, then repeats the last entry.
    pub fn sequence(frames: Vec<Vec<DetectedFace>>) -> Self {
        Self::from_steps(frames.into_iter().map(Ok).collect())
    }

    /// Replays arbitrary results, including errors.
    pub fn script(steps: Vec<Result<Vec<DetectedFace>, OracleError>>) -> Self {
        Self::from_steps(steps)
    }

    /// Fails the first `count` initialization attempts.
    pub fn with_init_failures(self, count: u32) -> Self {
        self.state.init_failures.store(count, Ordering::SeqCst);
        self
    }

    /// Adds a fixed delay to every `send`.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.state
            .latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
        self
    }

    /// Replaces the script; the next call plays its first entry.
    pub fn replace_script(&self, frames: Vec<Vec<DetectedFace>>) {
        let mut steps = self.state.steps.lock().unwrap_or_else(|e| e.into_inner());
        *steps = frames.into_iter().map(Ok).collect();
        self.state.send_calls.store(0, Ordering::SeqCst);
    }

    pub fn init_calls(&self) -> u32 {
        self.state.init_calls.load(Ordering::SeqCst)
    }

    pub fn send_calls(&self) -> u64 {
        self.state.send_calls.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }

    fn step(&self, index: u64) -> Step {
        let steps = self.state.steps.lock().unwrap_or_else(|e| e.into_inner());
        if steps.is_empty() {
            return Ok(Vec::new());
        }
        let i = (index as usize).min(steps.len() - 1);
        steps[i].clone()
    }
}

#[async_trait]
impl DetectionOracle for ScriptedOracle {
    async fn initialize(&self) -> Result<(), OracleError> {
        self.state.init_calls.fetch_add(1, Ordering::SeqCst);
        if self.is_closed() {
            return Err(OracleError::Closed);
        }
        let remaining = self.state.init_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.state.init_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(OracleError::Load("model download failed".into()));
        }
        Ok(())
    }

    async fn send(&self, _frame: &Frame) -> Result<Vec<DetectedFace>, OracleError> {
        let index = self.state.send_calls.fetch_add(1, Ordering::SeqCst);
        let latency = self.state.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.is_closed() {
            return Err(OracleError::Closed);
        }
        self.step(index)
    }

    fn close(&self) {
        self.state.closed.store(true, Ordering::SeqCst);
    }
}
