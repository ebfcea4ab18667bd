//! The capture session task.

use super::callbacks::SessionCallbacks;
use super::error::{CaptureError, SessionOutcome};
use super::events::{SessionCommand, SessionEvent};
use super::state::{CaptureState, CapturedFrames};
use super::stats::SessionStats;
use super::upload::{run_upload, UploadError, UploadProgress, UploadReceipt};
use super::SessionConfig;
use crate::analysis::{QualityBand, QualityScorer, TemporalValidator, ValidationRejection};
use crate::backend::{AuthContext, BiometricBackend};
use crate::capture::{
    acquire_with_fallback, CameraError, CaptureConfig, CaptureSurface, FileConfig, Frame,
    FrameSource, StreamInfo,
};
use crate::detection::{
    Detection, DetectionOracle, DetectorAdapter, DetectorInitError, DetectorStatus,
};
use crate::timing::{TimerFired, TimerKind, TimerSet};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

const COMMAND_BUFFER: usize = 16;

/// Sends commands to a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    pub async fn send(&self, command: SessionCommand) -> Result<(), CaptureError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| CaptureError::SessionClosed)
    }

    /// Sends from outside the async runtime, e.g. a signal handler thread.
    ///
    /// Must not be called from within an async context.
    pub fn send_blocking(&self, command: SessionCommand) -> Result<(), CaptureError> {
        self.commands
            .blocking_send(command)
            .map_err(|_| CaptureError::SessionClosed)
    }

    pub async fn close(&self) -> Result<(), CaptureError> {
        self.send(SessionCommand::Close).await
    }

    /// True once the session has stopped accepting commands.
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

/// Final account of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub outcome: SessionOutcome,
    pub final_state: CaptureState,
    pub stats: SessionStats,
    /// Camera released and detector closed.
    pub resources_released: bool,
}

/// Returned when a session ends; hands the camera back to the owner.
pub struct SessionReport<C> {
    pub summary: SessionSummary,
    pub camera: C,
}

enum UploadMessage {
    Progress(UploadProgress),
    Finished(Result<UploadReceipt, UploadError>),
}

enum Startup {
    Ready(Option<StreamInfo>),
    CameraFailed(CameraError),
    DetectorFailed(DetectorInitError),
    Closed,
}

/// One capture session.
///
/// Owns the camera and detector exclusively; [`run`](Self::run) drives the
/// state machine until a terminal state and always releases both before
/// returning.
pub struct CaptureSession<C, O, B>
where
    C: FrameSource + 'static,
    O: DetectionOracle,
    B: BiometricBackend,
{
    camera: C,
    adapter: Arc<DetectorAdapter<O>>,
    backend: Arc<B>,
    auth: AuthContext,
    capture_config: CaptureConfig,
    config: SessionConfig,

    validator: TemporalValidator,
    scorer: QualityScorer,
    surface: CaptureSurface,
    timers: TimerSet,
    timer_rx: mpsc::UnboundedReceiver<TimerFired>,

    commands: mpsc::Receiver<SessionCommand>,
    events: mpsc::UnboundedSender<SessionEvent>,
    detections_tx: mpsc::UnboundedSender<Detection>,
    detections_rx: mpsc::UnboundedReceiver<Detection>,
    uploads_tx: mpsc::UnboundedSender<UploadMessage>,
    uploads_rx: mpsc::UnboundedReceiver<UploadMessage>,
    /// Cleared on teardown; late task results check it before posting.
    active: Arc<AtomicBool>,
    callbacks: SessionCallbacks,

    state: CaptureState,
    shots: CapturedFrames,
    selected: Option<usize>,
    last_face_count: Option<usize>,
    hold_count: u32,
    manual_available: bool,
    stats: SessionStats,
}

impl<C, O, B> CaptureSession<C, O, B>
where
    C: FrameSource + 'static,
    O: DetectionOracle,
    B: BiometricBackend,
{
    /// Creates a session. Nothing is acquired until [`run`](Self::run).
    pub fn new(
        camera: C,
        oracle: O,
        backend: Arc<B>,
        auth: AuthContext,
        config: &FileConfig,
        callbacks: SessionCallbacks,
    ) -> (Self, SessionHandle, mpsc::UnboundedReceiver<SessionEvent>) {
        let (commands_tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let (events, events_rx) = mpsc::unbounded_channel();
        let (detections_tx, detections_rx) = mpsc::unbounded_channel();
        let (uploads_tx, uploads_rx) = mpsc::unbounded_channel();
        let (timers, timer_rx) = TimerSet::new();

        let session = Self {
            camera,
            adapter: Arc::new(DetectorAdapter::new(oracle, config.detector.clone())),
            backend,
            auth,
            capture_config: config.capture.clone(),
            config: config.session.clone(),
            validator: TemporalValidator::new(config.validation.clone()),
            scorer: QualityScorer::new(config.scoring.clone()),
            surface: CaptureSurface::new(config.capture.jpeg_quality),
            timers,
            timer_rx,
            commands,
            events,
            detections_tx,
            detections_rx,
            uploads_tx,
            uploads_rx,
            active: Arc::new(AtomicBool::new(true)),
            callbacks,
            state: CaptureState::Launch,
            shots: CapturedFrames::new(config.session.max_shots),
            selected: None,
            last_face_count: None,
            hold_count: 0,
            manual_available: false,
            stats: SessionStats::default(),
        };

        (
            session,
            SessionHandle {
                commands: commands_tx,
            },
            events_rx,
        )
    }

    /// Runs the session to completion.
    pub async fn run(mut self) -> SessionReport<C> {
        let outcome = match self.auth.credentials() {
            Err(reason) => {
                tracing::warn!(%reason, "refusing to start capture session");
                SessionOutcome::Refused { reason }
            }
            Ok(credentials) => {
                tracing::info!(
                    identity = credentials.identity(),
                    mode = %self.config.mode,
                    "capture session started"
                );
                self.spawn_status_forwarder();
                self.drive().await
            }
        };

        self.teardown();
        match &outcome {
            SessionOutcome::Success { .. } => {
                self.transition(CaptureState::Success);
                self.callbacks.succeed(self.config.mode);
            }
            SessionOutcome::Cancelled => {
                self.transition(CaptureState::Cancelled);
                self.callbacks.cancel();
            }
            SessionOutcome::Refused { .. } => {}
        }

        let summary = SessionSummary {
            outcome,
            final_state: self.state,
            stats: self.stats.clone(),
            resources_released: !self.camera.is_active() && self.adapter.is_closed(),
        };
        tracing::info!(
            state = %summary.final_state,
            captures = summary.stats.captures,
            frames = summary.stats.frames_received,
            "capture session ended"
        );

        SessionReport {
            summary,
            camera: self.camera,
        }
    }

    async fn drive(&mut self) -> SessionOutcome {
        loop {
            if self.state == CaptureState::Launch {
                match self.startup().await {
                    Startup::Ready(info) => {
                        if let Some(info) = info {
                            tracing::info!(
                                width = info.width,
                                height = info.height,
                                relaxed = info.relaxed,
                                "camera stream acquired"
                            );
                            self.stats.camera_relaxed |= info.relaxed;
                        }
                        self.enter_camera();
                    }
                    Startup::CameraFailed(error) => {
                        tracing::warn!(%error, "camera acquisition failed");
                        self.fail(error.user_message());
                    }
                    Startup::DetectorFailed(error) => {
                        tracing::warn!(%error, "detector unavailable");
                        self.fail(error.user_message());
                    }
                    Startup::Closed => return SessionOutcome::Cancelled,
                }
                continue;
            }

            if let Some(outcome) = self.step().await {
                return outcome;
            }
        }
    }

    /// Acquires the camera and loads the detector, honoring `Close`.
    async fn startup(&mut self) -> Startup {
        let camera = &mut self.camera;
        let adapter = &self.adapter;
        let constraints = &self.capture_config.constraints;
        let commands = &mut self.commands;

        let work = async move {
            let info = if camera.is_active() {
                None
            } else {
                Some(
                    acquire_with_fallback(camera, constraints)
                        .await
                        .map_err(Startup::CameraFailed)?,
                )
            };
            if !adapter.is_ready() {
                adapter.initialize().await.map_err(Startup::DetectorFailed)?;
            }
            Ok::<_, Startup>(Startup::Ready(info))
        };
        tokio::pin!(work);

        loop {
            tokio::select! {
                result = &mut work => return result.unwrap_or_else(|failure| failure),
                command = commands.recv() => match command {
                    Some(SessionCommand::Close) | None => return Startup::Closed,
                    Some(other) => tracing::debug!(?other, "command ignored during startup"),
                },
            }
        }
    }

    async fn step(&mut self) -> Option<SessionOutcome> {
        let wants_frames = self.state.consumes_frames();

        tokio::select! {
            biased;

            command = self.commands.recv() => match command {
                Some(command) => self.handle_command(command).await,
                None => {
                    tracing::info!("all session handles dropped, closing");
                    Some(SessionOutcome::Cancelled)
                }
            },
            Some(fired) = self.timer_rx.recv() => {
                self.handle_timer(fired).await;
                None
            }
            Some(message) = self.uploads_rx.recv() => self.handle_upload(message),
            Some(detection) = self.detections_rx.recv() => {
                self.handle_detection(detection);
                None
            }
            frame = self.camera.next_frame(), if wants_frames => {
                self.handle_frame(frame);
                None
            }
        }
    }

    async fn handle_command(&mut self, command: SessionCommand) -> Option<SessionOutcome> {
        tracing::debug!(?command, state = %self.state, "command received");

        match (command, self.state) {
            (SessionCommand::Close, _) => return Some(SessionOutcome::Cancelled),
            (SessionCommand::CancelCountdown, CaptureState::Countdown) => {
                self.timers.cancel(TimerKind::Countdown);
                self.validator.reset();
                self.enter_camera();
            }
            (SessionCommand::ManualCapture, CaptureState::Camera | CaptureState::Detecting) => {
                self.manual_capture().await;
            }
            (SessionCommand::SelectShot(index), CaptureState::Preview) => {
                if index < self.shots.len() {
                    self.selected = Some(index);
                } else {
                    self.emit(SessionEvent::Message(format!("Shot {} does not exist.", index + 1)));
                }
            }
            (SessionCommand::Retake, CaptureState::Preview) => {
                self.shots.clear();
                self.selected = None;
                self.validator.reset();
                self.scorer.reset();
                self.enter_camera();
            }
            (SessionCommand::Confirm, CaptureState::Preview) => self.start_upload(),
            (SessionCommand::Retry, CaptureState::Failure) => self.transition(CaptureState::Launch),
            (command, state) => {
                tracing::debug!(?command, %state, "command ignored in current state");
            }
        }
        None
    }

    fn handle_frame(&mut self, frame: Result<Frame, CameraError>) {
        let frame = match frame {
            Ok(frame) => frame,
            Err(error) => return self.camera_lost(error),
        };
        self.stats.frames_received += 1;

        match self.adapter.try_submit(frame) {
            Ok(pending) => {
                let tx = self.detections_tx.clone();
                let active = Arc::clone(&self.active);
                tokio::spawn(async move {
                    let detection = pending.run().await;
                    if active.load(Ordering::Acquire) {
                        let _ = tx.send(detection);
                    }
                });
            }
            Err(reason) => {
                self.stats.frames_skipped += 1;
                tracing::trace!(?reason, "frame not submitted");
            }
        }
    }

    fn handle_detection(&mut self, detection: Detection) {
        let faces = match detection {
            Detection::Faces(faces) => faces,
            Detection::Skipped(reason) => {
                self.stats.frames_skipped += 1;
                tracing::trace!(?reason, "detection skipped");
                return;
            }
        };
        if !self.state.consumes_frames() {
            tracing::trace!(state = %self.state, "late detection discarded");
            return;
        }

        self.stats.frames_processed += 1;
        self.stats.detector_errors = self.adapter.runtime_errors();

        let outcome = self.validator.observe(&faces);
        let update = self.scorer.update(&faces, Instant::now());
        self.last_face_count = Some(faces.len());
        self.stats.last_score = Some(update.sample.score);
        self.stats.confirmations = self.validator.confirmations();

        if update.publish {
            self.emit(SessionEvent::Quality(update.sample));
        }
        if update.instruction_changed {
            self.emit(SessionEvent::Instruction(update.sample.instruction));
        }

        let acceptable = update.sample.band != QualityBand::Poor;
        match self.state {
            CaptureState::Camera if outcome.confirmed && acceptable => {
                self.hold_count = 0;
                self.transition(CaptureState::Detecting);
                self.maybe_start_countdown();
            }
            CaptureState::Detecting => {
                if let Some(rejection) = outcome.rejection {
                    self.stats.detections_lost += 1;
                    self.emit(SessionEvent::Shake);
                    self.emit(SessionEvent::Message(rejection.user_message().to_string()));
                    self.enter_camera();
                } else if acceptable {
                    self.hold_count += 1;
                    self.maybe_start_countdown();
                }
            }
            _ => {}
        }
    }

    async fn handle_timer(&mut self, fired: TimerFired) {
        if !self.timers.accept(&fired) {
            tracing::trace!(?fired, "stale timer firing dropped");
            return;
        }

        match fired.kind {
            TimerKind::Countdown => {
                if self.state != CaptureState::Countdown {
                    return;
                }
                self.emit(SessionEvent::CountdownTick(fired.remaining));
                if fired.remaining == 0 {
                    self.capture().await;
                }
            }
            TimerKind::ManualCaptureGrace => {
                self.manual_available = true;
                tracing::info!("manual capture available");
                self.emit(SessionEvent::ManualCaptureAvailable);
            }
        }
    }

    fn handle_upload(&mut self, message: UploadMessage) -> Option<SessionOutcome> {
        if self.state != CaptureState::Uploading {
            tracing::trace!(state = %self.state, "late upload message discarded");
            return None;
        }

        match message {
            UploadMessage::Progress(progress) => self.emit(SessionEvent::UploadProgress(progress)),
            UploadMessage::Finished(Ok(receipt)) => {
                self.stats.uploads_succeeded += 1;
                return Some(SessionOutcome::Success { receipt });
            }
            UploadMessage::Finished(Err(error)) => {
                self.stats.uploads_failed += 1;
                tracing::warn!(%error, "upload failed");
                self.emit(SessionEvent::Message(error.user_message().to_string()));
                if error.requires_retake() {
                    self.shots.clear();
                    self.selected = None;
                    self.validator.reset();
                    self.enter_camera();
                } else {
                    self.transition(CaptureState::Preview);
                }
            }
        }
        None
    }

    fn maybe_start_countdown(&mut self) {
        if !self.config.auto_capture || self.hold_count < self.config.hold_frames {
            return;
        }
        let ticks = self.config.countdown_ticks;
        self.transition(CaptureState::Countdown);
        self.emit(SessionEvent::CountdownTick(ticks));
        self.timers.schedule_ticks(
            TimerKind::Countdown,
            Duration::from_millis(self.config.countdown_tick_ms),
            ticks,
        );
    }

    async fn manual_capture(&mut self) {
        if !self.manual_available {
            self.emit(SessionEvent::Message(
                "Manual capture is not available yet.".to_string(),
            ));
            return;
        }
        match self.last_face_count.unwrap_or(0) {
            1 => self.capture().await,
            0 => self.emit(SessionEvent::Message(
                ValidationRejection::NoFace.user_message().to_string(),
            )),
            count => self.emit(SessionEvent::Message(
                ValidationRejection::MultipleFaces { count }
                    .user_message()
                    .to_string(),
            )),
        }
    }

    /// Grabs one native frame and stores it as a shot.
    async fn capture(&mut self) {
        self.timers.cancel(TimerKind::Countdown);
        self.transition(CaptureState::Capturing);

        let timeout = Duration::from_millis(self.config.capture_timeout_ms);
        let frame = match tokio::time::timeout(timeout, self.camera.next_frame()).await {
            Ok(Ok(frame)) => frame,
            Ok(Err(error)) => return self.camera_lost(error),
            Err(_) => {
                return self.camera_lost(CameraError::CaptureFailed(
                    "no frame before capture timeout".into(),
                ))
            }
        };

        // The surface restores native orientation from the displayed frame.
        let frame = self.capture_config.preview(frame);
        let score = self.scorer.last_sample().map_or(0.0, |s| s.score);
        let image = match self.surface.capture(&frame, score) {
            Ok(image) => image,
            Err(error) => {
                tracing::warn!(%error, "capture failed");
                self.emit(SessionEvent::Message(
                    "Capture failed. Please try again.".to_string(),
                ));
                self.validator.reset();
                self.enter_camera();
                return;
            }
        };

        self.stats.captures += 1;
        let target = self.config.shots_per_session.min(self.shots.max());
        if self.shots.push(image) {
            let index = self.shots.len();
            tracing::info!(index, total = target, "shot captured");
            self.emit(SessionEvent::ShotCaptured {
                index,
                total: target,
            });
        }

        if self.shots.len() >= target {
            self.selected = self.shots.best();
            self.transition(CaptureState::Preview);
        } else {
            self.validator.reset();
            self.enter_camera();
        }
    }

    fn start_upload(&mut self) {
        let credentials = match self.auth.credentials() {
            Ok(credentials) => credentials,
            Err(error) => {
                tracing::warn!(%error, "upload blocked");
                self.emit(SessionEvent::Message(error.user_message().to_string()));
                return;
            }
        };
        let image = match self.selected.or_else(|| self.shots.best()).and_then(|i| self.shots.get(i)) {
            Some(image) => image.clone(),
            None => {
                self.emit(SessionEvent::Message(
                    "Nothing to upload. Please retake the photo.".to_string(),
                ));
                return;
            }
        };

        self.stats.upload_attempts += 1;
        self.transition(CaptureState::Uploading);

        let backend = Arc::clone(&self.backend);
        let tx = self.uploads_tx.clone();
        let active = Arc::clone(&self.active);
        let mode = self.config.mode;
        tokio::spawn(async move {
            let progress_tx = tx.clone();
            let result = run_upload(&*backend, &image, &credentials, mode, |progress| {
                let _ = progress_tx.send(UploadMessage::Progress(progress));
            })
            .await;
            if active.load(Ordering::Acquire) {
                let _ = tx.send(UploadMessage::Finished(result));
            }
        });
    }

    fn enter_camera(&mut self) {
        self.hold_count = 0;
        self.last_face_count = None;
        self.transition(CaptureState::Camera);
        if !self.manual_available && !self.timers.is_scheduled(TimerKind::ManualCaptureGrace) {
            self.timers.schedule_once(
                TimerKind::ManualCaptureGrace,
                Duration::from_millis(self.config.manual_grace_ms),
            );
        }
    }

    fn fail(&mut self, message: &str) {
        self.stats.startup_failures += 1;
        self.transition(CaptureState::Failure);
        self.emit(SessionEvent::RetryPrompt(message.to_string()));
    }

    /// The stream died mid-session; release it so `Retry` can reacquire.
    fn camera_lost(&mut self, error: CameraError) {
        tracing::error!(%error, "camera stream failed");
        self.timers.cancel(TimerKind::Countdown);
        self.camera.release();
        self.validator.reset();
        self.fail(error.user_message());
    }

    fn teardown(&mut self) {
        self.timers.cancel_all();
        self.scorer.cancel_timers();
        self.adapter.close();
        self.camera.release();
        self.active.store(false, Ordering::Release);
        self.shots.clear();
        self.selected = None;
        tracing::debug!("session resources released");
    }

    fn spawn_status_forwarder(&self) {
        let mut status = self.adapter.status();
        let events = self.events.clone();
        tokio::spawn(async move {
            loop {
                let current = *status.borrow_and_update();
                if events.send(SessionEvent::DetectorStatus(current)).is_err()
                    || current == DetectorStatus::Closed
                {
                    break;
                }
                if status.changed().await.is_err() {
                    break;
                }
            }
        });
    }

    fn transition(&mut self, to: CaptureState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        tracing::info!(%from, %to, "state transition");
        self.emit(SessionEvent::StateChanged { from, to });
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}
