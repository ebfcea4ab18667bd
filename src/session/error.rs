//! Session-level errors and outcomes.

use super::upload::UploadReceipt;
use crate::backend::AuthError;
use crate::capture::{CameraError, ConfigError};
use crate::detection::DetectorInitError;
use serde::Serialize;
use thiserror::Error;

/// Errors surfaced by session management.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Camera(#[from] CameraError),

    #[error(transparent)]
    Detector(#[from] DetectorInitError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("camera is held by another session")]
    CameraUnavailable,

    #[error("session has ended")]
    SessionClosed,

    #[error("session task aborted: {0}")]
    SessionAborted(String),
}

impl CaptureError {
    pub fn user_message(&self) -> &'static str {
        match self {
            CaptureError::Auth(e) => e.user_message(),
            CaptureError::Camera(e) => e.user_message(),
            CaptureError::Detector(e) => e.user_message(),
            CaptureError::Config(_) => "Face capture is misconfigured.",
            CaptureError::CameraUnavailable => "The camera is already in use.",
            CaptureError::SessionClosed | CaptureError::SessionAborted(_) => {
                "The capture session has ended."
            }
        }
    }
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SessionOutcome {
    Success { receipt: UploadReceipt },
    Cancelled,
    /// The session never started because credentials were missing.
    Refused {
        #[serde(serialize_with = "serialize_display")]
        reason: AuthError,
    },
}

fn serialize_display<S: serde::Serializer>(error: &AuthError, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}
