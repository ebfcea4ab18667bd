//! Face Capture Library
//!
//! Quality-gated face capture for biometric registration and verification.
//! Live camera frames are checked by an external face detector; only a face
//! that is stable, well framed and confidently detected over several frames
//! triggers a capture, which is then uploaded to a biometric backend.
//!
//! # Architecture
//!
//! The system follows an explicit data flow:
//!
//! ```text
//! capture → detection → analysis → session → backend
//!   frames    oracle     validator    state     detect +
//!             adapter    + scorer     machine   register/verify
//!                            ↑           ↓
//!                          timing (countdown, grace, debounce)
//! ```
//!
//! # Design Principles
//!
//! - **Fail-closed gating**: a single bad frame resets face confirmation
//! - **Untrusted detector**: per-frame errors count as "no face", never crash
//! - **Exclusive resources**: one session owns the camera and detector, and
//!   releases both on every exit path
//! - **Native captures**: the mirrored preview is never baked into a capture
//!
//! # Example
//!
//! ```no_run
//! use face_capture::{
//!     backend::{AuthContext, MockBackend},
//!     capture::{FileConfig, MockCamera},
//!     detection::ScriptedOracle,
//!     session::{CaptureSession, SessionCallbacks},
//! };
//! use std::sync::Arc;
//!
//! # async fn demo() {
//! let (session, handle, mut events) = CaptureSession::new(
//!     MockCamera::new(),
//!     ScriptedOracle::constant(Vec::new()),
//!     Arc::new(MockBackend::accepting()),
//!     AuthContext::new("user-1", "token"),
//!     &FileConfig::default(),
//!     SessionCallbacks::new(),
//! );
//! let task = tokio::spawn(session.run());
//!
//! while let Some(event) = events.recv().await {
//!     println!("{:?}", event);
//! #   break;
//! }
//! handle.close().await.ok();
//! let report = task.await.unwrap();
//! assert!(report.summary.resources_released);
//! # }
//! ```

#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod analysis;
pub mod backend;
pub mod capture;
pub mod detection;
pub mod metrics;
pub mod session;
pub mod timing;

// Re-export commonly used types at crate root
pub use analysis::{QualityBand, QualityScorer, TemporalValidator, ValidationThresholds};
pub use backend::{AuthContext, BiometricBackend, MockBackend};
pub use capture::{CaptureSurface, CapturedImage, FileConfig, Frame, FrameSource, MockCamera};
pub use detection::{DetectedFace, DetectionOracle, DetectorAdapter, ScriptedOracle};
pub use session::{
    CaptureSession, CaptureState, SessionCallbacks, SessionCommand, SessionEvent, SessionManager,
    SessionMode,
};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
