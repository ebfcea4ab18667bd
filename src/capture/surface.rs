//! Off-screen capture surface.
//!
//! Converts one live frame into the image that is uploaded. The preview
//! may be mirrored, but the captured pixels are always in native sensor
//! orientation and at the stream's native resolution.

use super::frame::{Frame, Orientation};
use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, RgbImage};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors produced while rendering a capture.
#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("frame buffer does not match its dimensions")]
    InvalidFrame,
    #[error("failed to encode capture: {0}")]
    Encode(#[from] image::ImageError),
}

/// An encoded still image ready for upload.
#[derive(Clone)]
pub struct CapturedImage {
    jpeg: Vec<u8>,
    width: u32,
    height: u32,
    digest: String,
    captured_at: DateTime<Utc>,
    source_sequence: u64,
    quality_score: f32,
}

impl CapturedImage {
    /// Encoded JPEG bytes.
    pub fn jpeg(&self) -> &[u8] {
        &self.jpeg
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Hex SHA-256 of the encoded bytes.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Sequence number of the frame this image was taken from.
    pub fn source_sequence(&self) -> u64 {
        self.source_sequence
    }

    /// Smoothed quality score at the moment of capture.
    pub fn quality_score(&self) -> f32 {
        self.quality_score
    }
}

impl std::fmt::Debug for CapturedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapturedImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("jpeg_bytes", &self.jpeg.len())
            .field("digest", &self.digest)
            .field("source_sequence", &self.source_sequence)
            .field("quality_score", &self.quality_score)
            .finish()
    }
}

/// Renders frames into uploadable stills.
#[derive(Debug, Clone)]
pub struct CaptureSurface {
    jpeg_quality: u8,
}

impl CaptureSurface {
    pub fn new(jpeg_quality: u8) -> Self {
        Self {
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    /// Returns the native-orientation pixels of `frame`.
    ///
    /// A mirrored preview frame is flipped back; a native frame is used
    /// as-is. No scaling is applied.
    pub fn native_pixels(frame: &Frame) -> Vec<u8> {
        match frame.orientation() {
            Orientation::Native => frame.pixels().to_vec(),
            Orientation::Mirrored => frame.mirrored().into_pixels(),
        }
    }

    /// Captures exactly one frame.
    pub fn capture(&self, frame: &Frame, quality_score: f32) -> Result<CapturedImage, SurfaceError> {
        if !frame.is_valid() || frame.pixel_count() == 0 {
            return Err(SurfaceError::InvalidFrame);
        }

        let pixels = Self::native_pixels(frame);
        let rgb = RgbImage::from_raw(frame.width(), frame.height(), pixels)
            .ok_or(SurfaceError::InvalidFrame)?;

        let mut jpeg = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut jpeg, self.jpeg_quality);
        DynamicImage::ImageRgb8(rgb).write_with_encoder(encoder)?;

        let digest = Sha256::digest(&jpeg)
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<String>();

        tracing::debug!(
            sequence = frame.sequence(),
            width = frame.width(),
            height = frame.height(),
            bytes = jpeg.len(),
            "frame captured"
        );

        Ok(CapturedImage {
            jpeg,
            width: frame.width(),
            height: frame.height(),
            digest,
            captured_at: Utc::now(),
            source_sequence: frame.sequence(),
            quality_score,
        })
    }
}

impl Default for CaptureSurface {
    fn default() -> Self {
        Self::new(92)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asymmetric_frame() -> Frame {
        // 4x2, left half red, right half blue
        let mut pixels = Vec::new();
        for _ in 0..2 {
            for x in 0..4 {
                if x < 2 {
                    pixels.extend_from_slice(&[255, 0, 0]);
                } else {
                    pixels.extend_from_slice(&[0, 0, 255]);
                }
            }
        }
        Frame::new(pixels, 4, 2, 9)
    }

    #[test]
    fn test_mirrored_preview_not_baked_into_capture() {
        let native = asymmetric_frame();
        let preview = native.mirrored();

        assert_ne!(preview.pixels(), native.pixels());
        assert_eq!(CaptureSurface::native_pixels(&preview), native.pixels());
        assert_eq!(CaptureSurface::native_pixels(&native), native.pixels());
    }

    #[test]
    fn test_capture_keeps_native_resolution() {
        let frame = Frame::filled(320, 240, [90, 120, 150], 3);
        let image = CaptureSurface::default().capture(&frame, 88.0).unwrap();

        assert_eq!((image.width(), image.height()), (320, 240));
        assert_eq!(image.source_sequence(), 3);
        assert_eq!(image.digest().len(), 64);
        // JPEG SOI marker
        assert_eq!(&image.jpeg()[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_capture_rejects_invalid_frame() {
        let frame = Frame::new(vec![0u8; 10], 320, 240, 1);
        assert!(matches!(
            CaptureSurface::default().capture(&frame, 0.0),
            Err(SurfaceError::InvalidFrame)
        ));
    }
}
