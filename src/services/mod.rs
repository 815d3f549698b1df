//! Conversion plumbing.
//!
//! The widget talks to a [`conversion::ConversionService`] through a shared
//! [`service_handle::ServiceHandle`], tracks combined progress with
//! [`progress::ProgressTracker`], and publishes finished output through an
//! [`artifacts::ArtifactStore`].

pub mod artifacts;
pub mod conversion;
pub mod ffmpeg;
pub mod picker;
pub mod progress;
pub mod service_handle;
