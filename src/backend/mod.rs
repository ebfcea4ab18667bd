//! Upload and verification against the biometric backend.
//!
//! The encoding and matching happen server-side; this module only moves a
//! captured JPEG and the caller's credentials to the service and decodes the
//! answer.

mod auth;
mod client;
#[cfg(feature = "http")]
mod http;

pub use auth::{AuthContext, AuthError, Credentials};
pub use client::{
    BackendCall, BackendError, BiometricBackend, DetectResponse, MockBackend, RegisterResponse,
    VerifyResponse,
};
#[cfg(feature = "http")]
pub use http::{HttpBackend, DIGEST_HEADER};

use serde::{Deserialize, Serialize};

/// Backend section of the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    pub detect_path: String,
    pub register_path: String,
    pub verify_path: String,
    /// Multipart field name of the image.
    pub image_field: String,
    pub timeout_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".into(),
            detect_path: "/api/face/detect".into(),
            register_path: "/api/face/register".into(),
            verify_path: "/api/face/verify".into(),
            image_field: "image".into(),
            timeout_ms: 30_000,
        }
    }
}
