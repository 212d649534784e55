//! pantrack-eye: vision stages for the pantrack visual servo
//!
//! Turns camera frames into a single horizontal angular error:
//! color segmentation, largest-region target location, and the
//! pixel-to-angle conversion. Also owns frame acquisition.

pub mod camera;
pub mod color;
pub mod error;
pub mod processing;

pub use camera::{frame_handoff, spawn_capture, FrameReceiver, FrameSender, FrameSource, ReplaySource};
#[cfg(feature = "opencv")]
pub use camera::OpenCvCamera;
pub use error::VisionError;
pub use processing::{to_angle, ColorSegmenter, Mask, TargetLocator};
