//! Frame type representing a captured video frame with metadata.

use tokio::time::Instant;

/// Bytes per pixel of the packed RGB8 layout used by every frame.
pub const BYTES_PER_PIXEL: usize = 3;

/// Pixel orientation of a frame relative to the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    /// Pixels exactly as the sensor delivered them.
    Native,
    /// Horizontally flipped, as shown in a selfie-style preview.
    Mirrored,
}

/// A single frame delivered by a [`FrameSource`](super::FrameSource).
///
/// Pixels are packed RGB8, row-major. The orientation records whether a
/// preview transform has been applied so that capture can always recover
/// the native pixel layout.
#[derive(Clone)]
pub struct Frame {
    /// Raw RGB8 pixel data.
    pixels: Vec<u8>,
    /// Frame width in pixels.
    width: u32,
    /// Frame height in pixels.
    height: u32,
    /// Arrival timestamp.
    timestamp: Instant,
    /// Monotonic sequence number assigned by the source.
    sequence: u64,
    orientation: Orientation,
}

impl Frame {
    /// Creates a new native-orientation frame.
    pub fn new(pixels: Vec<u8>, width: u32, height: u32, sequence: u64) -> Self {
        Self {
            pixels,
            width,
            height,
            timestamp: Instant::now(),
            sequence,
            orientation: Orientation::Native,
        }
    }

    /// Creates a uniformly coloured frame. Mostly useful for mocks.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3], sequence: u64) -> Self {
        let pixel_count = (width as usize) * (height as usize);
        let mut pixels = Vec::with_capacity(pixel_count * BYTES_PER_PIXEL);
        for _ in 0..pixel_count {
            pixels.extend_from_slice(&rgb);
        }
        Self::new(pixels, width, height, sequence)
    }

    /// Returns a reference to the raw pixel data.
    #[inline]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Returns the frame width.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the frame height.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns the arrival timestamp.
    #[inline]
    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    /// Returns the sequence number.
    #[inline]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Returns the pixel orientation.
    #[inline]
    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Returns the total number of pixels (width * height).
    #[inline]
    pub fn pixel_count(&self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    /// Validates that the pixel buffer size matches dimensions.
    pub fn is_valid(&self) -> bool {
        self.pixels.len() == self.pixel_count() * BYTES_PER_PIXEL
    }

    /// True when either dimension is zero or larger than `max_dimension`.
    ///
    /// Such frames must never reach the detector.
    pub fn is_degenerate(&self, max_dimension: u32) -> bool {
        self.width == 0
            || self.height == 0
            || self.width > max_dimension
            || self.height > max_dimension
            || !self.is_valid()
    }

    /// Returns a horizontally flipped copy for on-screen preview.
    ///
    /// Mirroring twice yields the native frame again.
    pub fn mirrored(&self) -> Frame {
        let row_bytes = self.width as usize * BYTES_PER_PIXEL;
        let mut pixels = Vec::with_capacity(self.pixels.len());
        if row_bytes > 0 {
            for row in self.pixels.chunks_exact(row_bytes) {
                for px in row.chunks_exact(BYTES_PER_PIXEL).rev() {
                    pixels.extend_from_slice(px);
                }
            }
        }

        Frame {
            pixels,
            width: self.width,
            height: self.height,
            timestamp: self.timestamp,
            sequence: self.sequence,
            orientation: match self.orientation {
                Orientation::Native => Orientation::Mirrored,
                Orientation::Mirrored => Orientation::Native,
            },
        }
    }

    /// Consumes the frame and returns its pixel buffer.
    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sequence", &self.sequence)
            .field("orientation", &self.orientation)
            .field("pixel_bytes", &self.pixels.len())
            .finish()
    }
}
