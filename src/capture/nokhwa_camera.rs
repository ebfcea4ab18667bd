//! Hardware camera backed by `nokhwa`.
//!
//! The device handle lives on a dedicated capture thread, which opens the
//! stream, forwards decoded RGB frames and closes the stream when the stop
//! flag is raised. Releasing the camera raises the flag and joins the
//! thread, so every track is stopped when `release` returns.

use super::{CameraError, CaptureConstraints, Frame, FrameSource, StreamInfo};
use async_trait::async_trait;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::{mpsc, oneshot};

struct Worker {
    stop: Arc<AtomicBool>,
    frames: mpsc::Receiver<Result<Frame, CameraError>>,
    thread: JoinHandle<()>,
}

/// Camera driven by the platform's native capture API.
#[derive(Default)]
pub struct NokhwaCamera {
    worker: Option<Worker>,
}

impl NokhwaCamera {
    pub fn new() -> Self {
        Self::default()
    }
}

fn classify(err: nokhwa::NokhwaError) -> CameraError {
    let text = err.to_string();
    let lower = text.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized") {
        CameraError::PermissionDenied(text)
    } else if lower.contains("busy") || lower.contains("in use") {
        CameraError::DeviceBusy(text)
    } else if lower.contains("format") || lower.contains("resolution") || lower.contains("property") {
        CameraError::ConstraintsUnsupported(text)
    } else {
        CameraError::DeviceNotFound(text)
    }
}

fn requested_format(constraints: &CaptureConstraints) -> RequestedFormat<'static> {
    match (constraints.width, constraints.height) {
        (Some(width), Some(height)) => {
            let format = CameraFormat::new(
                Resolution::new(width, height),
                FrameFormat::MJPEG,
                constraints.frame_rate.unwrap_or(30),
            );
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::Exact(format))
        }
        _ => RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate),
    }
}

fn run_capture(
    index: u32,
    format: RequestedFormat<'static>,
    ready: oneshot::Sender<Result<(u32, u32), CameraError>>,
    frames: mpsc::Sender<Result<Frame, CameraError>>,
    stop: Arc<AtomicBool>,
) {
    let mut camera = match nokhwa::Camera::new(CameraIndex::Index(index), format) {
        Ok(camera) => camera,
        Err(e) => {
            let _ = ready.send(Err(classify(e)));
            return;
        }
    };
    if let Err(e) = camera.open_stream() {
        let _ = ready.send(Err(classify(e)));
        return;
    }

    let resolution = camera.resolution();
    if ready
        .send(Ok((resolution.width_x, resolution.height_y)))
        .is_err()
    {
        let _ = camera.stop_stream();
        return;
    }

    let mut sequence = 0u64;
    while !stop.load(Ordering::Acquire) {
        let result = camera
            .frame()
            .and_then(|buffer| buffer.decode_image::<RgbFormat>())
            .map(|decoded| {
                sequence += 1;
                let (width, height) = (decoded.width(), decoded.height());
                Frame::new(decoded.into_raw(), width, height, sequence)
            })
            .map_err(|e| CameraError::CaptureFailed(e.to_string()));

        if frames.blocking_send(result).is_err() {
            break;
        }
    }

    if let Err(e) = camera.stop_stream() {
        tracing::warn!(error = %e, "failed to stop camera stream");
    }
    tracing::info!("camera capture thread stopped");
}

#[async_trait]
impl FrameSource for NokhwaCamera {
    async fn acquire(
        &mut self,
        constraints: &CaptureConstraints,
    ) -> Result<StreamInfo, CameraError> {
        if self.worker.is_some() {
            return Err(CameraError::DeviceBusy("stream already live".into()));
        }

        let index = constraints.device_id.unwrap_or(0);
        let format = requested_format(constraints);
        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = oneshot::channel();
        let (frame_tx, frame_rx) = mpsc::channel(2);

        let thread_stop = Arc::clone(&stop);
        let thread = std::thread::Builder::new()
            .name("face-capture-camera".into())
            .spawn(move || run_capture(index, format, ready_tx, frame_tx, thread_stop))
            .map_err(|e| CameraError::DeviceBusy(e.to_string()))?;

        let (width, height) = match ready_rx.await {
            Ok(Ok(size)) => size,
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(CameraError::DeviceNotFound("capture thread exited".into()));
            }
        };

        self.worker = Some(Worker {
            stop,
            frames: frame_rx,
            thread,
        });
        tracing::info!(index, width, height, "camera acquired");

        Ok(StreamInfo {
            width,
            height,
            track_count: 1,
            relaxed: false,
        })
    }

    async fn next_frame(&mut self) -> Result<Frame, CameraError> {
        let worker = self.worker.as_mut().ok_or(CameraError::NotAcquired)?;
        worker
            .frames
            .recv()
            .await
            .unwrap_or(Err(CameraError::CaptureFailed("capture thread exited".into())))
    }

    fn release(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.stop.store(true, Ordering::Release);
            // Unblocks a pending blocking_send.
            worker.frames.close();
            while worker.frames.try_recv().is_ok() {}
            if worker.thread.join().is_err() {
                tracing::error!("camera capture thread panicked");
            }
            tracing::info!("camera released");
        }
    }

    fn is_active(&self) -> bool {
        self.worker.is_some()
    }
}

impl Drop for NokhwaCamera {
    fn drop(&mut self) {
        self.release();
    }
}
