//! Two-step upload: face-count check, then register or verify.
//!
//! Neither step is retried here. A failure is returned to the session,
//! which hands control back to the user.

use super::SessionMode;
use crate::backend::{BackendError, BiometricBackend, Credentials};
use crate::capture::CapturedImage;
use serde::Serialize;
use thiserror::Error;

/// Phase label shown with upload progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadPhase {
    Validating,
    Registering,
    Verifying,
    Complete,
}

/// Upload progress; `percent` never decreases within one upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UploadProgress {
    pub percent: u8,
    pub phase: UploadPhase,
}

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadReceipt {
    pub mode: SessionMode,
    pub digest: String,
    pub message: String,
}

/// Upload failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    /// The server did not accept the photo as exactly one face.
    #[error("server found {found} faces: {message}")]
    FaceCount { found: u32, message: String },

    /// Register or verify answered negatively.
    #[error("{mode} rejected: {message}")]
    Rejected { mode: SessionMode, message: String },

    #[error("{phase:?} failed: {source}")]
    Backend {
        phase: UploadPhase,
        #[source]
        source: BackendError,
    },
}

impl UploadError {
    pub fn user_message(&self) -> &'static str {
        match self {
            UploadError::FaceCount { found: 0, .. } => {
                "No face was found in the photo. Please retake it."
            }
            UploadError::FaceCount { found: 1, .. } => {
                "The photo could not be validated. Please retake it."
            }
            UploadError::FaceCount { .. } => {
                "More than one face was found in the photo. Please retake it."
            }
            UploadError::Rejected {
                mode: SessionMode::Register,
                ..
            } => "Registration failed. Please try again.",
            UploadError::Rejected {
                mode: SessionMode::Verify,
                ..
            } => "Your face did not match. Please try again.",
            UploadError::Backend { source, .. } => source.user_message(),
        }
    }

    /// True if the shot itself is unusable and should be retaken.
    pub fn requires_retake(&self) -> bool {
        matches!(self, UploadError::FaceCount { .. })
    }
}

struct ProgressTracker<F> {
    last: u8,
    report: F,
}

impl<F: FnMut(UploadProgress)> ProgressTracker<F> {
    fn advance(&mut self, percent: u8, phase: UploadPhase) {
        let percent = percent.min(100).max(self.last);
        self.last = percent;
        (self.report)(UploadProgress { percent, phase });
    }
}

/// Uploads one image.
pub async fn run_upload<B, F>(
    backend: &B,
    image: &CapturedImage,
    credentials: &Credentials,
    mode: SessionMode,
    report: F,
) -> Result<UploadReceipt, UploadError>
where
    B: BiometricBackend + ?Sized,
    F: FnMut(UploadProgress),
{
    let mut progress = ProgressTracker { last: 0, report };
    progress.advance(10, UploadPhase::Validating);

    let detected = backend
        .detect(image, credentials)
        .await
        .map_err(|source| UploadError::Backend {
            phase: UploadPhase::Validating,
            source,
        })?;
    if !detected.success || detected.faces_detected != 1 {
        tracing::warn!(
            found = detected.faces_detected,
            success = detected.success,
            "server rejected the photo"
        );
        return Err(UploadError::FaceCount {
            found: detected.faces_detected,
            message: detected.message,
        });
    }

    let message = match mode {
        SessionMode::Register => {
            progress.advance(50, UploadPhase::Registering);
            let response = backend
                .register(image, credentials)
                .await
                .map_err(|source| UploadError::Backend {
                    phase: UploadPhase::Registering,
                    source,
                })?;
            if !response.success {
                return Err(UploadError::Rejected {
                    mode,
                    message: response.message,
                });
            }
            response.message
        }
        SessionMode::Verify => {
            progress.advance(50, UploadPhase::Verifying);
            let response = backend
                .verify(image, credentials)
                .await
                .map_err(|source| UploadError::Backend {
                    phase: UploadPhase::Verifying,
                    source,
                })?;
            if !response.valid {
                return Err(UploadError::Rejected {
                    mode,
                    message: response.message,
                });
            }
            response.message
        }
    };

    progress.advance(100, UploadPhase::Complete);
    tracing::info!(%mode, digest = image.digest(), "upload complete");

    Ok(UploadReceipt {
        mode,
        digest: image.digest().to_string(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{AuthContext, BackendCall, DetectResponse, MockBackend, RegisterResponse};
    use crate::capture::{CaptureSurface, Frame};

    fn image() -> CapturedImage {
        CaptureSurface::default()
            .capture(&Frame::filled(16, 16, [90, 80, 70], 1), 96.0)
            .unwrap()
    }

    fn credentials() -> Credentials {
        AuthContext::new("user-1", "token").credentials().unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_register_flow_progress_monotonic() {
        let backend = MockBackend::accepting();
        let mut seen = Vec::new();

        let receipt = run_upload(&backend, &image(), &credentials(), SessionMode::Register, |p| {
            seen.push(p)
        })
        .await
        .unwrap();

        assert_eq!(receipt.mode, SessionMode::Register);
        assert_eq!(backend.calls(), vec![BackendCall::Detect, BackendCall::Register]);
        assert!(seen.windows(2).all(|w| w[0].percent <= w[1].percent));
        assert_eq!(seen.last().map(|p| p.phase), Some(UploadPhase::Complete));
    }

    #[tokio::test(start_paused = true)]
    async fn test_face_count_mismatch_stops_before_operation() {
        let backend = MockBackend::accepting().with_faces_detected(2);
        let result = run_upload(&backend, &image(), &credentials(), SessionMode::Verify, |_| {}).await;

        assert!(matches!(result, Err(UploadError::FaceCount { found: 2, .. })));
        assert!(result.unwrap_err().requires_retake());
        assert_eq!(backend.calls(), vec![BackendCall::Detect]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsuccessful_detection_with_one_face_requires_retake() {
        let backend = MockBackend::accepting().with_detect_response(Ok(DetectResponse {
            success: false,
            faces_detected: 1,
            message: "face too blurry".into(),
        }));
        let result =
            run_upload(&backend, &image(), &credentials(), SessionMode::Register, |_| {}).await;

        let err = result.unwrap_err();
        assert_eq!(
            err,
            UploadError::FaceCount {
                found: 1,
                message: "face too blurry".into()
            }
        );
        assert!(err.requires_retake());
        assert_eq!(
            err.user_message(),
            "The photo could not be validated. Please retake it."
        );
        assert_eq!(backend.calls(), vec![BackendCall::Detect]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_registration() {
        let backend = MockBackend::accepting().with_register_response(Ok(RegisterResponse {
            success: false,
            message: "already registered".into(),
        }));
        let result =
            run_upload(&backend, &image(), &credentials(), SessionMode::Register, |_| {}).await;

        let err = result.unwrap_err();
        assert!(matches!(err, UploadError::Rejected { .. }));
        assert!(!err.requires_retake());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_reports_phase() {
        let backend =
            MockBackend::accepting().with_detect_error(BackendError::Transport("reset".into()));
        let result = run_upload(&backend, &image(), &credentials(), SessionMode::Verify, |_| {}).await;

        assert!(matches!(
            result,
            Err(UploadError::Backend {
                phase: UploadPhase::Validating,
                ..
            })
        ));
    }
}
