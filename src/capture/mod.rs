//! Camera acquisition, frames and still capture.
//!
//! This module owns the camera lifecycle: acquiring a stream (with a
//! single constraint-relaxation retry), delivering frames, and rendering
//! the one frame that becomes the uploaded image.

mod camera;
mod config;
mod frame;
#[cfg(feature = "camera")]
mod nokhwa_camera;
mod surface;

pub use camera::{
    acquire_with_fallback, CameraError, FrameSource, MockCamera, StreamInfo, TrackProbe,
    TrackState,
};
pub use config::{CaptureConfig, CaptureConstraints, ConfigError, Facing, FileConfig};
pub use frame::{Frame, Orientation, BYTES_PER_PIXEL};
#[cfg(feature = "camera")]
pub use nokhwa_camera::NokhwaCamera;
pub use surface::{CaptureSurface, CapturedImage, SurfaceError};
