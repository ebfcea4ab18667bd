//! Biometric backend interface and a scripted in-memory backend.

use super::auth::Credentials;
use crate::capture::CapturedImage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

/// Response of the face-count check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectResponse {
    pub success: bool,
    pub faces_detected: u32,
    #[serde(default)]
    pub message: String,
}

/// Response of a registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

/// Response of a verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyResponse {
    #[serde(alias = "matched")]
    pub valid: bool,
    #[serde(default)]
    pub message: String,
}

/// Errors returned by a backend call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("invalid response: {0}")]
    Decode(String),
}

impl BackendError {
    pub fn user_message(&self) -> &'static str {
        match self {
            BackendError::Transport(_) => "Could not reach the server. Check your connection.",
            BackendError::Status { status, .. } if *status == 401 || *status == 403 => {
                "Your session has expired. Please sign in again."
            }
            BackendError::Status { .. } | BackendError::Decode(_) => {
                "The server could not process the image. Please try again."
            }
        }
    }
}

/// Remote biometric service.
#[async_trait]
pub trait BiometricBackend: Send + Sync + 'static {
    /// Counts faces in the uploaded image.
    async fn detect(
        &self,
        image: &CapturedImage,
        credentials: &Credentials,
    ) -> Result<DetectResponse, BackendError>;

    /// Enrolls the face for the signed-in identity.
    async fn register(
        &self,
        image: &CapturedImage,
        credentials: &Credentials,
    ) -> Result<RegisterResponse, BackendError>;

    /// Matches the face against the enrolled identity.
    async fn verify(
        &self,
        image: &CapturedImage,
        credentials: &Credentials,
    ) -> Result<VerifyResponse, BackendError>;
}

/// A call recorded by [`MockBackend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendCall {
    Detect,
    Register,
    Verify,
}

struct MockState {
    detect: Result<DetectResponse, BackendError>,
    register: Result<RegisterResponse, BackendError>,
    verify: Result<VerifyResponse, BackendError>,
    latency: Duration,
    calls: Vec<(BackendCall, String)>,
}

/// In-memory backend with fixed responses.
///
/// Clones share the call log and responses.
#[derive(Clone)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    /// A backend that finds one face and accepts every operation.
    pub fn accepting() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                detect: Ok(DetectResponse {
                    success: true,
                    faces_detected: 1,
                    message: "1 face detected".into(),
                }),
                register: Ok(RegisterResponse {
                    success: true,
                    message: "face registered".into(),
                }),
                verify: Ok(VerifyResponse {
                    valid: true,
                    message: "face matched".into(),
                }),
                latency: Duration::from_millis(50),
                calls: Vec::new(),
            })),
        }
    }

    fn with_state(self, apply: impl FnOnce(&mut MockState)) -> Self {
        apply(&mut self.lock());
        self
    }

    pub fn with_faces_detected(self, faces: u32) -> Self {
        self.with_state(|s| {
            s.detect = Ok(DetectResponse {
                success: faces == 1,
                faces_detected: faces,
                message: format!("{} faces detected", faces),
            })
        })
    }

    pub fn with_detect_response(self, response: Result<DetectResponse, BackendError>) -> Self {
        self.with_state(|s| s.detect = response)
    }

    pub fn with_detect_error(self, error: BackendError) -> Self {
        self.with_state(|s| s.detect = Err(error))
    }

    pub fn with_register_response(self, response: Result<RegisterResponse, BackendError>) -> Self {
        self.with_state(|s| s.register = response)
    }

    pub fn with_verify_response(self, response: Result<VerifyResponse, BackendError>) -> Self {
        self.with_state(|s| s.verify = response)
    }

    pub fn with_latency(self, latency: Duration) -> Self {
        self.with_state(|s| s.latency = latency)
    }

    /// Calls received so far, in order.
    pub fn calls(&self) -> Vec<BackendCall> {
        self.lock().calls.iter().map(|(call, _)| *call).collect()
    }

    /// Digests of the images received so far, in call order.
    pub fn uploaded_digests(&self) -> Vec<String> {
        self.lock().calls.iter().map(|(_, digest)| digest.clone()).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn record(&self, call: BackendCall, image: &CapturedImage) {
        let latency = {
            let mut state = self.lock();
            state.calls.push((call, image.digest().to_string()));
            state.latency
        };
        tokio::time::sleep(latency).await;
    }
}

#[async_trait]
impl BiometricBackend for MockBackend {
    async fn detect(
        &self,
        image: &CapturedImage,
        _credentials: &Credentials,
    ) -> Result<DetectResponse, BackendError> {
        self.record(BackendCall::Detect, image).await;
        self.lock().detect.clone()
    }

    async fn register(
        &self,
        image: &CapturedImage,
        _credentials: &Credentials,
    ) -> Result<RegisterResponse, BackendError> {
        self.record(BackendCall::Register, image).await;
        self.lock().register.clone()
    }

    async fn verify(
        &self,
        image: &CapturedImage,
        _credentials: &Credentials,
    ) -> Result<VerifyResponse, BackendError> {
        self.record(BackendCall::Verify, image).await;
        self.lock().verify.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_accepts_matched_alias() {
        let response: VerifyResponse =
            serde_json::from_str(r#"{"matched": true, "message": "ok"}"#).unwrap();
        assert!(response.valid);

        let response: VerifyResponse = serde_json::from_str(r#"{"valid": false}"#).unwrap();
        assert!(!response.valid);
        assert!(response.message.is_empty());
    }

    #[test]
    fn test_detect_response_decodes() {
        let response: DetectResponse =
            serde_json::from_str(r#"{"success": true, "faces_detected": 2, "message": "x"}"#)
                .unwrap();
        assert_eq!(response.faces_detected, 2);
    }

    #[test]
    fn test_auth_status_message() {
        let error = BackendError::Status {
            status: 401,
            message: "expired".into(),
        };
        assert_eq!(
            error.user_message(),
            "Your session has expired. Please sign in again."
        );
    }
}
