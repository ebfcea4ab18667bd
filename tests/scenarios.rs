//! End-to-end capture sessions against the mock camera, scripted detector
//! and in-memory backend.
//!
//! All tests run on paused tokio time, so countdowns and grace periods
//! elapse instantly while keeping their ordering.

use face_capture::{
    analysis::{Instruction, QualityBand, ValidationRejection},
    backend::{AuthContext, BackendCall, MockBackend, RegisterResponse},
    capture::{
        CameraError, CaptureConstraints, FileConfig, FrameSource, MockCamera, TrackProbe,
    },
    detection::{BoundingBox, DetectedFace, ScriptedOracle},
    session::{
        CaptureSession, CaptureState, SessionCallbacks, SessionCommand, SessionEvent,
        SessionHandle, SessionMode, SessionOutcome, SessionReport,
    },
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

fn config() -> FileConfig {
    let mut config = FileConfig::default();
    config.capture.constraints = CaptureConstraints::with_dimensions(160, 120);
    config
}

fn centered_face() -> DetectedFace {
    DetectedFace::new(BoundingBox::centered(0.5, 0.5, 0.4, 0.45), 0.95)
}

/// Fills half the frame: passes validation but scores poorly.
fn close_face() -> DetectedFace {
    DetectedFace::new(BoundingBox::centered(0.5, 0.5, 0.7, 0.71), 0.95)
}

#[derive(Clone, Default)]
struct Fired {
    success: Arc<AtomicU32>,
    cancel: Arc<AtomicU32>,
    registered: Arc<AtomicU32>,
}

impl Fired {
    fn callbacks(&self) -> SessionCallbacks {
        let (s, c, r) = (
            Arc::clone(&self.success),
            Arc::clone(&self.cancel),
            Arc::clone(&self.registered),
        );
        SessionCallbacks::new()
            .on_success(move || {
                s.fetch_add(1, Ordering::SeqCst);
            })
            .on_cancel(move || {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .on_registration_complete(move || {
                r.fetch_add(1, Ordering::SeqCst);
            })
    }

    fn counts(&self) -> (u32, u32, u32) {
        (
            self.success.load(Ordering::SeqCst),
            self.cancel.load(Ordering::SeqCst),
            self.registered.load(Ordering::SeqCst),
        )
    }
}

struct Harness {
    task: JoinHandle<SessionReport<MockCamera>>,
    handle: SessionHandle,
    events: UnboundedReceiver<SessionEvent>,
    probe: TrackProbe,
    fired: Fired,
}

impl Harness {
    fn start(camera: MockCamera, oracle: ScriptedOracle, backend: MockBackend, config: FileConfig) -> Self {
        let probe = camera.probe();
        let fired = Fired::default();
        let (session, handle, events) = CaptureSession::new(
            camera,
            oracle,
            Arc::new(backend),
            AuthContext::new("user-1", "token"),
            &config,
            fired.callbacks(),
        );
        Self {
            task: tokio::spawn(session.run()),
            handle,
            events,
            probe,
            fired,
        }
    }

    fn centered(backend: MockBackend, config: FileConfig) -> Self {
        Self::start(
            MockCamera::new(),
            ScriptedOracle::constant(vec![centered_face()]),
            backend,
            config,
        )
    }

    /// Collects events until the session enters `target`.
    async fn until_state(&mut self, target: CaptureState) -> Vec<SessionEvent> {
        self.until(|e| matches!(e, SessionEvent::StateChanged { to, .. } if *to == target))
            .await
    }

    async fn until(&mut self, done: impl Fn(&SessionEvent) -> bool) -> Vec<SessionEvent> {
        let mut seen = Vec::new();
        while let Some(event) = self.events.recv().await {
            let reached = done(&event);
            seen.push(event);
            if reached {
                return seen;
            }
        }
        panic!("session ended early; saw {:?}", seen);
    }

    async fn send(&self, command: SessionCommand) {
        self.handle.send(command).await.unwrap();
    }

    /// Closes the session and returns its report plus every unread event.
    async fn close(self) -> (SessionReport<MockCamera>, Vec<SessionEvent>, TrackProbe, Fired) {
        let _ = self.handle.close().await;
        self.finish().await
    }

    async fn finish(mut self) -> (SessionReport<MockCamera>, Vec<SessionEvent>, TrackProbe, Fired) {
        let report = self.task.await.unwrap();
        let mut rest = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            rest.push(event);
        }
        (report, rest, self.probe, self.fired)
    }
}

fn shots(events: &[SessionEvent]) -> Vec<(usize, usize)> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::ShotCaptured { index, total } => Some((*index, *total)),
            _ => None,
        })
        .collect()
}

fn messages(events: &[SessionEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Message(m) => Some(m.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn centered_face_captures_and_verifies() {
    let backend = MockBackend::accepting();
    let mut session = Harness::centered(backend.clone(), config());

    let seen = session.until_state(CaptureState::Preview).await;
    let states: Vec<CaptureState> = seen
        .iter()
        .filter_map(|e| match e {
            SessionEvent::StateChanged { to, .. } => Some(*to),
            _ => None,
        })
        .collect();
    assert_eq!(
        states,
        vec![
            CaptureState::Camera,
            CaptureState::Detecting,
            CaptureState::Countdown,
            CaptureState::Capturing,
            CaptureState::Preview,
        ]
    );
    let ticks: Vec<u32> = seen
        .iter()
        .filter_map(|e| match e {
            SessionEvent::CountdownTick(n) => Some(*n),
            _ => None,
        })
        .collect();
    assert_eq!(ticks, vec![3, 2, 1, 0]);
    assert_eq!(shots(&seen), vec![(1, 1)]);
    assert!(seen.iter().any(|e| matches!(
        e,
        SessionEvent::Quality(sample) if sample.band == QualityBand::Excellent
    )));

    session.send(SessionCommand::Confirm).await;
    let seen = session.until_state(CaptureState::Uploading).await;
    assert!(shots(&seen).is_empty());

    let (report, rest, probe, fired) = session.finish().await;
    match &report.summary.outcome {
        SessionOutcome::Success { receipt } => {
            assert_eq!(receipt.mode, SessionMode::Verify);
            assert_eq!(backend.uploaded_digests(), vec![receipt.digest.clone(); 2]);
        }
        other => panic!("expected success, got {:?}", other),
    }
    assert_eq!(backend.calls(), vec![BackendCall::Detect, BackendCall::Verify]);
    assert_eq!(report.summary.final_state, CaptureState::Success);
    assert_eq!(report.summary.stats.captures, 1);
    assert!(report.summary.resources_released);
    assert!(probe.all_stopped());
    assert_eq!(fired.counts(), (1, 0, 0));

    let percents: Vec<u8> = rest
        .iter()
        .filter_map(|e| match e {
            SessionEvent::UploadProgress(p) => Some(p.percent),
            _ => None,
        })
        .collect();
    assert_eq!(percents.last(), Some(&100));
    assert!(percents.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test(start_paused = true)]
async fn countdown_captures_exactly_once() {
    let mut session = Harness::centered(MockBackend::accepting(), config());
    let mut seen = session.until_state(CaptureState::Preview).await;

    // Nothing else is captured while the shot waits for review.
    tokio::time::sleep(Duration::from_secs(10)).await;
    let (report, rest, probe, fired) = session.close().await;
    seen.extend(rest);

    assert_eq!(shots(&seen), vec![(1, 1)]);
    assert_eq!(report.summary.stats.captures, 1);
    assert_eq!(report.summary.outcome, SessionOutcome::Cancelled);
    assert!(probe.all_stopped());
    assert_eq!(fired.counts(), (0, 1, 0));
}

#[tokio::test(start_paused = true)]
async fn too_close_face_never_reaches_detecting() {
    let mut session = Harness::start(
        MockCamera::new(),
        ScriptedOracle::constant(vec![close_face()]),
        MockBackend::accepting(),
        config(),
    );
    session.until_state(CaptureState::Camera).await;
    tokio::time::sleep(Duration::from_secs(3)).await;

    let (report, events, probe, _) = session.close().await;
    assert!(!events.iter().any(|e| matches!(
        e,
        SessionEvent::StateChanged { to: CaptureState::Detecting, .. }
    )));
    assert!(events.contains(&SessionEvent::Instruction(Instruction::MoveBack)));
    let sample = events
        .iter()
        .find_map(|e| match e {
            SessionEvent::Quality(sample) => Some(*sample),
            _ => None,
        })
        .unwrap();
    assert_eq!(sample.score, 70.0);
    assert_eq!(sample.band, QualityBand::Poor);
    assert_eq!(sample.instruction, Instruction::MoveBack);

    // Validation alone is satisfied; the quality gate holds it back.
    assert!(report.summary.stats.confirmations >= 1);
    assert_eq!(report.summary.stats.captures, 0);
    assert!(probe.all_stopped());
}

#[tokio::test(start_paused = true)]
async fn no_face_rejects_manual_capture() {
    let mut session = Harness::start(
        MockCamera::new(),
        ScriptedOracle::constant(Vec::new()),
        MockBackend::accepting(),
        config(),
    );
    session.until_state(CaptureState::Camera).await;

    let seen = session
        .until(|e| matches!(e, SessionEvent::Quality(_)))
        .await;
    match seen.last() {
        Some(SessionEvent::Quality(sample)) => {
            assert_eq!(sample.score, 0.0);
            assert_eq!(sample.instruction, Instruction::NoFace);
            assert_eq!(sample.smoothed_area, None);
        }
        other => panic!("expected a quality update, got {:?}", other),
    }

    session.send(SessionCommand::ManualCapture).await;
    let seen = session
        .until(|e| matches!(e, SessionEvent::Message(_)))
        .await;
    assert_eq!(
        messages(&seen),
        vec!["Manual capture is not available yet.".to_string()]
    );

    session
        .until(|e| matches!(e, SessionEvent::ManualCaptureAvailable))
        .await;
    session.send(SessionCommand::ManualCapture).await;
    let seen = session
        .until(|e| matches!(e, SessionEvent::Message(_)))
        .await;
    assert_eq!(
        messages(&seen),
        vec![ValidationRejection::NoFace.user_message().to_string()]
    );
    let (report, _, probe, fired) = session.close().await;
    assert_eq!(report.summary.stats.captures, 0);
    assert_eq!(report.summary.stats.last_score, Some(0.0));
    assert!(probe.all_stopped());
    assert_eq!(fired.counts(), (0, 1, 0));
}

#[tokio::test(start_paused = true)]
async fn two_faces_reject_manual_capture() {
    let mut session = Harness::start(
        MockCamera::new(),
        ScriptedOracle::constant(vec![centered_face(), centered_face()]),
        MockBackend::accepting(),
        config(),
    );
    let mut seen = session
        .until(|e| matches!(e, SessionEvent::ManualCaptureAvailable))
        .await;

    session.send(SessionCommand::ManualCapture).await;
    seen.extend(
        session
            .until(|e| matches!(e, SessionEvent::Message(_)))
            .await,
    );
    assert_eq!(
        messages(&seen),
        vec![ValidationRejection::MultipleFaces { count: 2 }
            .user_message()
            .to_string()]
    );

    let (report, rest, track, _) = session.close().await;
    seen.extend(rest);
    assert!(shots(&seen).is_empty());
    assert!(!seen.iter().any(|e| matches!(
        e,
        SessionEvent::StateChanged {
            to: CaptureState::Detecting | CaptureState::Capturing,
            ..
        }
    )));
    assert_eq!(report.summary.stats.captures, 0);
    assert_eq!(report.summary.stats.confirmations, 0);
    assert!(track.all_stopped());
}

#[tokio::test(start_paused = true)]
async fn manual_capture_after_grace_period() {
    // Validation never passes, so only a manual capture can take the shot.
    let face = DetectedFace::new(BoundingBox::centered(0.5, 0.5, 0.4, 0.45), 0.8);
    let mut session = Harness::start(
        MockCamera::new(),
        ScriptedOracle::constant(vec![face]),
        MockBackend::accepting(),
        config(),
    );
    session
        .until(|e| matches!(e, SessionEvent::ManualCaptureAvailable))
        .await;
    session.send(SessionCommand::ManualCapture).await;
    let seen = session.until_state(CaptureState::Preview).await;
    assert_eq!(shots(&seen), vec![(1, 1)]);

    let (report, _, _, _) = session.close().await;
    assert_eq!(report.summary.stats.captures, 1);
    assert_eq!(report.summary.stats.confirmations, 0);
}

#[tokio::test(start_paused = true)]
async fn multi_shot_session_counts_captures() {
    let mut config = config();
    config.session.shots_per_session = 3;
    let mut session = Harness::centered(MockBackend::accepting(), config);

    let seen = session.until_state(CaptureState::Preview).await;
    assert_eq!(shots(&seen), vec![(1, 3), (2, 3), (3, 3)]);

    session.send(SessionCommand::SelectShot(5)).await;
    let seen = session
        .until(|e| matches!(e, SessionEvent::Message(_)))
        .await;
    assert_eq!(messages(&seen), vec!["Shot 6 does not exist.".to_string()]);

    session.send(SessionCommand::SelectShot(1)).await;
    session.send(SessionCommand::Confirm).await;
    let (report, _, probe, fired) = session.finish().await;
    assert!(matches!(report.summary.outcome, SessionOutcome::Success { .. }));
    assert_eq!(report.summary.stats.captures, 3);
    assert!(probe.all_stopped());
    assert_eq!(fired.counts(), (1, 0, 0));
}

#[tokio::test(start_paused = true)]
async fn cancel_countdown_returns_to_scanning() {
    let mut session = Harness::centered(MockBackend::accepting(), config());
    session.until_state(CaptureState::Countdown).await;

    session.send(SessionCommand::CancelCountdown).await;
    let seen = session.until_state(CaptureState::Camera).await;
    assert!(shots(&seen).is_empty());
    assert!(seen.contains(&SessionEvent::StateChanged {
        from: CaptureState::Countdown,
        to: CaptureState::Camera,
    }));

    // The face is still there, so the gate opens again.
    session.until_state(CaptureState::Countdown).await;
    let (report, _, probe, _) = session.close().await;
    assert_eq!(report.summary.stats.captures, 0);
    assert!(probe.all_stopped());
}

#[tokio::test(start_paused = true)]
async fn losing_the_face_resets_detection() {
    let oracle = ScriptedOracle::constant(vec![centered_face()]);
    let mut session = Harness::start(
        MockCamera::new(),
        oracle.clone(),
        MockBackend::accepting(),
        config(),
    );
    session.until_state(CaptureState::Detecting).await;
    oracle.replace_script(vec![Vec::new()]);

    let seen = session.until_state(CaptureState::Camera).await;
    assert!(seen.contains(&SessionEvent::Shake));
    assert!(messages(&seen).contains(&ValidationRejection::NoFace.user_message().to_string()));

    let (report, _, _, _) = session.close().await;
    assert!(report.summary.stats.detections_lost >= 1);
    assert_eq!(report.summary.stats.captures, 0);
}

#[tokio::test(start_paused = true)]
async fn backend_face_count_mismatch_requires_retake() {
    let backend = MockBackend::accepting().with_faces_detected(2);
    let mut session = Harness::centered(backend.clone(), config());
    session.until_state(CaptureState::Preview).await;

    session.send(SessionCommand::Confirm).await;
    let seen = session
        .until(|e| {
            matches!(
                e,
                SessionEvent::StateChanged {
                    from: CaptureState::Uploading,
                    ..
                }
            )
        })
        .await;
    assert_eq!(
        seen.last(),
        Some(&SessionEvent::StateChanged {
            from: CaptureState::Uploading,
            to: CaptureState::Camera,
        })
    );
    assert!(messages(&seen)
        .contains(&"More than one face was found in the photo. Please retake it.".to_string()));
    assert_eq!(backend.calls(), vec![BackendCall::Detect]);

    let (report, _, probe, fired) = session.close().await;
    assert_eq!(report.summary.outcome, SessionOutcome::Cancelled);
    assert_eq!(report.summary.stats.uploads_failed, 1);
    assert!(probe.all_stopped());
    assert_eq!(fired.counts(), (0, 1, 0));
}

#[tokio::test(start_paused = true)]
async fn failed_registration_returns_to_preview() {
    let backend = MockBackend::accepting().with_register_response(Ok(RegisterResponse {
        success: false,
        message: "already registered".into(),
    }));
    let mut config = config();
    config.session.mode = SessionMode::Register;
    let mut session = Harness::centered(backend.clone(), config);
    session.until_state(CaptureState::Preview).await;

    session.send(SessionCommand::Confirm).await;
    session.until_state(CaptureState::Uploading).await;
    let seen = session.until_state(CaptureState::Preview).await;
    assert!(messages(&seen).contains(&"Registration failed. Please try again.".to_string()));
    assert_eq!(backend.calls(), vec![BackendCall::Detect, BackendCall::Register]);

    session.send(SessionCommand::Retake).await;
    session.until_state(CaptureState::Camera).await;

    let (report, _, _, fired) = session.close().await;
    assert_eq!(report.summary.outcome, SessionOutcome::Cancelled);
    assert_eq!(fired.counts(), (0, 1, 0));
}

#[tokio::test(start_paused = true)]
async fn registration_fires_completion_callback() {
    let backend = MockBackend::accepting();
    let mut config = config();
    config.session.mode = SessionMode::Register;
    let mut session = Harness::centered(backend.clone(), config);
    session.until_state(CaptureState::Preview).await;
    session.send(SessionCommand::Confirm).await;

    let (report, _, _, fired) = session.finish().await;
    assert!(matches!(
        report.summary.outcome,
        SessionOutcome::Success { ref receipt } if receipt.mode == SessionMode::Register
    ));
    assert_eq!(backend.calls(), vec![BackendCall::Detect, BackendCall::Register]);
    assert_eq!(fired.counts(), (1, 0, 1));
}

#[tokio::test(start_paused = true)]
async fn close_during_upload_discards_result() {
    let backend = MockBackend::accepting().with_latency(Duration::from_secs(5));
    let mut session = Harness::centered(backend, config());
    session.until_state(CaptureState::Preview).await;
    session.send(SessionCommand::Confirm).await;
    session.until_state(CaptureState::Uploading).await;

    let (report, events, probe, fired) = session.close().await;
    assert_eq!(report.summary.outcome, SessionOutcome::Cancelled);
    assert!(!events.contains(&SessionEvent::StateChanged {
        from: CaptureState::Uploading,
        to: CaptureState::Success,
    }));
    assert!(probe.all_stopped());
    assert_eq!(fired.counts(), (0, 1, 0));
}

#[tokio::test(start_paused = true)]
async fn close_releases_camera_in_every_state() {
    for target in [
        CaptureState::Camera,
        CaptureState::Detecting,
        CaptureState::Countdown,
        CaptureState::Preview,
    ] {
        let mut session = Harness::centered(MockBackend::accepting(), config());
        session.until_state(target).await;
        assert!(session.probe.attached());

        let (report, _, probe, fired) = session.close().await;
        assert_eq!(report.summary.final_state, CaptureState::Cancelled, "{}", target);
        assert!(report.summary.resources_released, "{}", target);
        assert!(!report.camera.is_active(), "{}", target);
        assert!(probe.all_stopped(), "{}", target);
        assert!(!probe.attached(), "{}", target);
        assert_eq!(fired.counts(), (0, 1, 0), "{}", target);
    }
}

#[tokio::test(start_paused = true)]
async fn unsupported_constraints_fall_back_to_basic() {
    let camera = MockCamera::new()
        .with_max_resolution(100, 100)
        .with_native_resolution(80, 60);
    let mut session = Harness::start(
        camera,
        ScriptedOracle::constant(Vec::new()),
        MockBackend::accepting(),
        config(),
    );
    session.until_state(CaptureState::Camera).await;

    let (report, _, probe, _) = session.close().await;
    assert!(report.summary.stats.camera_relaxed);
    assert_eq!(probe.acquisitions(), 1);
    assert!(probe.all_stopped());
}

#[tokio::test(start_paused = true)]
async fn permission_denied_prompts_retry() {
    let camera = MockCamera::new()
        .with_acquire_failures([CameraError::PermissionDenied("user dismissed prompt".into())]);
    let mut session = Harness::start(
        camera,
        ScriptedOracle::constant(Vec::new()),
        MockBackend::accepting(),
        config(),
    );
    session.until_state(CaptureState::Failure).await;
    let seen = session
        .until(|e| matches!(e, SessionEvent::RetryPrompt(_)))
        .await;
    assert_eq!(
        seen.last(),
        Some(&SessionEvent::RetryPrompt(
            CameraError::PermissionDenied(String::new())
                .user_message()
                .to_string()
        ))
    );
    assert_eq!(session.probe.acquisitions(), 0);

    session.send(SessionCommand::Retry).await;
    session.until_state(CaptureState::Camera).await;
    assert_eq!(session.probe.acquisitions(), 1);

    let (report, _, probe, _) = session.close().await;
    assert_eq!(report.summary.stats.startup_failures, 1);
    assert!(probe.all_stopped());
}
