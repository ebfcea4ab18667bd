//! Prometheus metrics for capture sessions.
//!
//! Session counters are collected in [`SessionStats`](crate::session::SessionStats)
//! and folded into a [`MetricsSnapshot`]; [`MetricsRegistry::update`] moves the
//! registry to the snapshot's totals.
//!
//! # Metrics Exposed
//!
//! - `face_capture_sessions_{started,succeeded,cancelled}_total`
//! - `face_capture_session_active`
//! - `face_capture_frames_{received,skipped,processed}_total`
//! - `face_capture_detector_errors_total`
//! - `face_capture_confirmations_total`
//! - `face_capture_quality_score`
//! - `face_capture_captures_total`
//! - `face_capture_uploads_{succeeded,failed}_total`
//! - `face_capture_startup_failures_total`
//!
//! # Example
//!
//! ```no_run
//! use face_capture::metrics::{MetricsRegistry, MetricsSnapshot};
//! use face_capture::session::SessionStats;
//!
//! let registry = MetricsRegistry::new().expect("Failed to create registry");
//! let snapshot = MetricsSnapshot::from_stats(&SessionStats::default());
//! registry.update(&snapshot);
//! println!("{}", registry.encode().unwrap());
//! ```

mod collector;

pub use collector::{MetricsError, MetricsRegistry, MetricsSnapshot};
