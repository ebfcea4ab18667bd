//! One-session-at-a-time ownership of the camera.

use super::callbacks::SessionCallbacks;
use super::controller::{CaptureSession, SessionHandle, SessionReport, SessionSummary};
use super::error::CaptureError;
use super::events::SessionEvent;
use crate::backend::{AuthContext, BiometricBackend};
use crate::capture::{FileConfig, FrameSource};
use crate::detection::DetectionOracle;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

struct Running<C> {
    handle: SessionHandle,
    task: JoinHandle<SessionReport<C>>,
}

/// Starts capture sessions on a single camera.
///
/// Starting a session while another is running first closes the old one
/// and waits for its report, so the camera and detector are released
/// before anything is acquired again.
pub struct SessionManager<C, O, B, F>
where
    C: FrameSource + 'static,
    O: DetectionOracle,
    B: BiometricBackend,
    F: Fn() -> O,
{
    camera: Option<C>,
    oracle_factory: F,
    backend: Arc<B>,
    auth: AuthContext,
    config: FileConfig,
    running: Option<Running<C>>,
}

impl<C, O, B, F> SessionManager<C, O, B, F>
where
    C: FrameSource + 'static,
    O: DetectionOracle,
    B: BiometricBackend,
    F: Fn() -> O,
{
    pub fn new(camera: C, oracle_factory: F, backend: Arc<B>, auth: AuthContext, config: FileConfig) -> Self {
        Self {
            camera: Some(camera),
            oracle_factory,
            backend,
            auth,
            config,
            running: None,
        }
    }

    /// Starts a new session, tearing down any running one first.
    ///
    /// Fails without touching the running session if no one is signed in.
    pub async fn start(
        &mut self,
        callbacks: SessionCallbacks,
    ) -> Result<(SessionHandle, mpsc::UnboundedReceiver<SessionEvent>), CaptureError> {
        self.auth.credentials()?;
        self.config.validate()?;

        if let Some(previous) = self.stop().await? {
            tracing::info!(outcome = ?previous.outcome, "previous session torn down");
        }

        let camera = self.camera.take().ok_or(CaptureError::CameraUnavailable)?;
        let (session, handle, events) = CaptureSession::new(
            camera,
            (self.oracle_factory)(),
            Arc::clone(&self.backend),
            self.auth.clone(),
            &self.config,
            callbacks,
        );
        let task = tokio::spawn(session.run());
        self.running = Some(Running {
            handle: handle.clone(),
            task,
        });

        Ok((handle, events))
    }

    /// Closes the running session and waits for it to finish.
    pub async fn stop(&mut self) -> Result<Option<SessionSummary>, CaptureError> {
        match self.running.as_ref() {
            Some(running) => {
                // The session may already have ended on its own.
                let _ = running.handle.close().await;
            }
            None => return Ok(None),
        }
        self.wait().await
    }

    /// Waits for the running session to reach a terminal state.
    pub async fn wait(&mut self) -> Result<Option<SessionSummary>, CaptureError> {
        let Some(running) = self.running.take() else {
            return Ok(None);
        };
        let mut report = running
            .task
            .await
            .map_err(|e| CaptureError::SessionAborted(e.to_string()))?;

        if report.camera.is_active() {
            tracing::error!("session returned a live camera, releasing");
            report.camera.release();
        }
        self.camera = Some(report.camera);
        Ok(Some(report.summary))
    }

    /// True while a session is running.
    pub fn is_running(&self) -> bool {
        self.running.as_ref().map_or(false, |r| !r.task.is_finished())
    }

    pub fn config(&self) -> &FileConfig {
        &self.config
    }
}
