//! Camera abstraction and acquisition lifecycle.
//!
//! A [`FrameSource`] owns the camera stream for one capture session. The
//! session acquires it on start and must release it on every exit path;
//! a stream that is never released keeps the device busy for the next
//! session.

use super::{CaptureConstraints, Frame};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during camera operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CameraError {
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),
    #[error("camera device not found: {0}")]
    DeviceNotFound(String),
    #[error("camera device busy: {0}")]
    DeviceBusy(String),
    #[error("camera constraints unsupported: {0}")]
    ConstraintsUnsupported(String),
    #[error("failed to capture frame: {0}")]
    CaptureFailed(String),
    #[error("camera not acquired")]
    NotAcquired,
}

impl CameraError {
    /// Message suitable for showing to the person in front of the camera.
    pub fn user_message(&self) -> &'static str {
        match self {
            CameraError::PermissionDenied(_) => {
                "Camera access was denied. Allow camera access in your settings and try again."
            }
            CameraError::DeviceNotFound(_) => "No camera was found. Connect a camera and try again.",
            CameraError::DeviceBusy(_) => {
                "The camera is in use by another application. Close it and try again."
            }
            CameraError::ConstraintsUnsupported(_) => {
                "Your camera does not support the required video settings."
            }
            CameraError::CaptureFailed(_) | CameraError::NotAcquired => {
                "The camera stopped responding. Please try again."
            }
        }
    }
}

/// Description of an acquired stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    /// Native frame width delivered by the device.
    pub width: u32,
    /// Native frame height delivered by the device.
    pub height: u32,
    /// Number of tracks in the stream.
    pub track_count: usize,
    /// True if the stream was obtained with relaxed constraints.
    pub relaxed: bool,
}

/// Trait for camera implementations.
///
/// `release` must stop every track and detach the stream from any preview
/// surface. It is idempotent and must be safe to call in any state.
#[async_trait]
pub trait FrameSource: Send {
    /// Requests camera access with the given constraints.
    async fn acquire(&mut self, constraints: &CaptureConstraints)
        -> Result<StreamInfo, CameraError>;

    /// Waits for the next frame. Cadence is set by the device.
    async fn next_frame(&mut self) -> Result<Frame, CameraError>;

    /// Stops all tracks and detaches the stream.
    fn release(&mut self);

    /// True while a stream is held.
    fn is_active(&self) -> bool;
}

/// Acquires a stream, retrying once with basic constraints when the
/// requested ones cannot be satisfied.
pub async fn acquire_with_fallback<S>(
    source: &mut S,
    constraints: &CaptureConstraints,
) -> Result<StreamInfo, CameraError>
where
    S: FrameSource + ?Sized,
{
    match source.acquire(constraints).await {
        Err(CameraError::ConstraintsUnsupported(reason)) if !constraints.is_basic() => {
            tracing::warn!(%reason, "camera rejected constraints, retrying with basic constraints");
            let mut info = source.acquire(&constraints.relaxed()).await?;
            info.relaxed = true;
            Ok(info)
        }
        other => other,
    }
}

/// State of a single media track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    Live,
    Ended,
}

#[derive(Debug, Default)]
struct ProbeState {
    tracks: Vec<TrackState>,
    attached: bool,
    acquisitions: u32,
    releases: u32,
}

/// Shared view of a [`MockCamera`]'s tracks.
///
/// Survives the camera being moved into a session, so tests can verify
/// that every track was stopped after the session ended.
#[derive(Debug, Clone, Default)]
pub struct TrackProbe {
    inner: Arc<Mutex<ProbeState>>,
}

impl TrackProbe {
    fn with<R>(&self, f: impl FnOnce(&mut ProbeState) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    /// Snapshot of every track ever opened on the current stream.
    pub fn tracks(&self) -> Vec<TrackState> {
        self.with(|s| s.tracks.clone())
    }

    /// True if no track is live.
    pub fn all_stopped(&self) -> bool {
        self.with(|s| s.tracks.iter().all(|t| *t == TrackState::Ended))
    }

    /// True while the stream is attached to the preview surface.
    pub fn attached(&self) -> bool {
        self.with(|s| s.attached)
    }

    /// Number of successful acquisitions.
    pub fn acquisitions(&self) -> u32 {
        self.with(|s| s.acquisitions)
    }

    /// Number of releases that actually stopped a live stream.
    pub fn releases(&self) -> u32 {
        self.with(|s| s.releases)
    }
}

/// Mock camera that generates synthetic frames.
///
/// Acquisition failures can be scripted; requesting a resolution above
/// `max_resolution` fails with `ConstraintsUnsupported`, and acquiring
/// while a stream is already live fails with `DeviceBusy`.
#[derive(Debug)]
pub struct MockCamera {
    native: (u32, u32),
    max_resolution: (u32, u32),
    frame_interval: Duration,
    scripted_failures: VecDeque<CameraError>,
    stream: Option<(u32, u32)>,
    sequence: u64,
    probe: TrackProbe,
}

impl Default for MockCamera {
    fn default() -> Self {
        Self {
            native: (640, 480),
            max_resolution: (1920, 1080),
            frame_interval: Duration::from_millis(33),
            scripted_failures: VecDeque::new(),
            stream: None,
            sequence: 0,
            probe: TrackProbe::default(),
        }
    }
}

impl MockCamera {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolution used when constraints leave it to the device.
    pub fn with_native_resolution(mut self, width: u32, height: u32) -> Self {
        self.native = (width, height);
        self
    }

    /// Largest resolution the mock accepts.
    pub fn with_max_resolution(mut self, width: u32, height: u32) -> Self {
        self.max_resolution = (width, height);
        self
    }

    /// Delay between frames.
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    /// Queues errors returned by the next acquisitions, in order.
    pub fn with_acquire_failures(mut self, failures: impl IntoIterator<Item = CameraError>) -> Self {
        self.scripted_failures.extend(failures);
        self
    }

    /// Returns a probe sharing this camera's track state.
    pub fn probe(&self) -> TrackProbe {
        self.probe.clone()
    }
}

#[async_trait]
impl FrameSource for MockCamera {
    async fn acquire(
        &mut self,
        constraints: &CaptureConstraints,
    ) -> Result<StreamInfo, CameraError> {
        constraints
            .validate()
            .map_err(|e| CameraError::ConstraintsUnsupported(e.to_string()))?;

        if self.stream.is_some() {
            return Err(CameraError::DeviceBusy("stream already live".into()));
        }
        if let Some(err) = self.scripted_failures.pop_front() {
            return Err(err);
        }

        let width = constraints.width.unwrap_or(self.native.0);
        let height = constraints.height.unwrap_or(self.native.1);
        if width > self.max_resolution.0 || height > self.max_resolution.1 {
            return Err(CameraError::ConstraintsUnsupported(format!(
                "{}x{} exceeds {}x{}",
                width, height, self.max_resolution.0, self.max_resolution.1
            )));
        }

        self.stream = Some((width, height));
        self.sequence = 0;
        self.probe.with(|s| {
            s.tracks = vec![TrackState::Live];
            s.attached = true;
            s.acquisitions += 1;
        });
        tracing::info!(width, height, "MockCamera acquired");

        Ok(StreamInfo {
            width,
            height,
            track_count: 1,
            relaxed: false,
        })
    }

    async fn next_frame(&mut self) -> Result<Frame, CameraError> {
        let (width, height) = self.stream.ok_or(CameraError::NotAcquired)?;
        tokio::time::sleep(self.frame_interval).await;

        self.sequence += 1;
        let shade = (self.sequence % 256) as u8;
        Ok(Frame::filled(width, height, [shade, 128, 255 - shade], self.sequence))
    }

    fn release(&mut self) {
        if self.stream.take().is_some() {
            self.probe.with(|s| {
                for track in s.tracks.iter_mut() {
                    *track = TrackState::Ended;
                }
                s.attached = false;
                s.releases += 1;
            });
            tracing::info!("MockCamera released");
        }
    }

    fn is_active(&self) -> bool {
        self.stream.is_some()
    }
}
