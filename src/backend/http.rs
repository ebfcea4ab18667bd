//! HTTP client for the biometric service.
//!
//! Images are sent as multipart JPEG uploads with bearer authentication.
//! The content digest travels in a header so the server can reject a
//! truncated upload.

use super::auth::Credentials;
use super::client::{BiometricBackend, BackendError, DetectResponse, RegisterResponse, VerifyResponse};
use super::BackendConfig;
use crate::capture::CapturedImage;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Header carrying the hex SHA-256 of the uploaded JPEG.
pub const DIGEST_HEADER: &str = "x-content-sha256";

/// Backend reached over HTTP.
pub struct HttpBackend {
    client: reqwest::Client,
    config: BackendConfig,
}

impl HttpBackend {
    pub fn new(config: BackendConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    async fn upload<T: DeserializeOwned>(
        &self,
        path: &str,
        image: &CapturedImage,
        credentials: &Credentials,
    ) -> Result<T, BackendError> {
        let part = Part::bytes(image.jpeg().to_vec())
            .file_name("capture.jpg")
            .mime_str("image/jpeg")
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        let form = Form::new()
            .part(self.config.image_field.clone(), part)
            .text("user_id", credentials.identity().to_string());

        let url = self.url(path);
        tracing::debug!(%url, bytes = image.jpeg().len(), "uploading capture");

        let response = self
            .client
            .post(&url)
            .bearer_auth(credentials.bearer())
            .header(DIGEST_HEADER, image.digest())
            .multipart(form)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))
    }
}

#[async_trait]
impl BiometricBackend for HttpBackend {
    async fn detect(
        &self,
        image: &CapturedImage,
        credentials: &Credentials,
    ) -> Result<DetectResponse, BackendError> {
        self.upload(&self.config.detect_path, image, credentials).await
    }

    async fn register(
        &self,
        image: &CapturedImage,
        credentials: &Credentials,
    ) -> Result<RegisterResponse, BackendError> {
        self.upload(&self.config.register_path, image, credentials).await
    }

    async fn verify(
        &self,
        image: &CapturedImage,
        credentials: &Credentials,
    ) -> Result<VerifyResponse, BackendError> {
        self.upload(&self.config.verify_path, image, credentials).await
    }
}
