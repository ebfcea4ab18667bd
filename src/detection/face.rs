//! Detector output types.

use serde::{Deserialize, Serialize};

/// Axis-aligned face box in normalized frame coordinates.
///
/// `x`/`y` are the top-left corner; all values are fractions of the frame
/// width and height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Box of the given size centered on `(cx, cy)`.
    pub fn centered(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self::new(cx - width / 2.0, cy - height / 2.0, width, height)
    }

    /// Normalizes a pixel-space box against the frame size.
    pub fn from_pixels(x: f32, y: f32, width: f32, height: f32, frame_width: u32, frame_height: u32) -> Self {
        let fw = frame_width.max(1) as f32;
        let fh = frame_height.max(1) as f32;
        Self::new(x / fw, y / fh, width / fw, height / fh)
    }

    #[inline]
    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Fraction of the frame covered by the box.
    #[inline]
    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    /// True if every coordinate is a finite number.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.width.is_finite() && self.height.is_finite()
    }

    /// Width over height; zero for a box without height.
    #[inline]
    pub fn aspect_ratio(&self) -> f32 {
        if self.height > 0.0 {
            self.width / self.height
        } else {
            0.0
        }
    }
}

/// One candidate face reported for a single frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawDetectedFace")]
pub struct DetectedFace {
    bbox: BoundingBox,
    confidence: f32,
}

#[derive(Deserialize)]
struct RawDetectedFace {
    bbox: BoundingBox,
    confidence: f32,
}

impl From<RawDetectedFace> for DetectedFace {
    fn from(raw: RawDetectedFace) -> Self {
        Self::new(raw.bbox, raw.confidence)
    }
}

impl DetectedFace {
    /// Confidence is clamped into `[0, 1]`; NaN becomes zero.
    pub fn new(bbox: BoundingBox, confidence: f32) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self { bbox, confidence }
    }

    /// Builds a face from a pixel-space box.
    pub fn from_pixels(
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        confidence: f32,
        frame_width: u32,
        frame_height: u32,
    ) -> Self {
        Self::new(
            BoundingBox::from_pixels(x, y, width, height, frame_width, frame_height),
            confidence,
        )
    }

    #[inline]
    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    #[inline]
    pub fn confidence(&self) -> f32 {
        self.confidence
    }
}
