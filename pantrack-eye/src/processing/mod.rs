//! Per-frame vision stages

pub mod angle;
pub mod detection;
pub mod segmentation;

pub use angle::{frame_center, pixel_error, to_angle};
pub use detection::{fill_enclosed, largest_region, regions, Region, TargetLocator};
pub use segmentation::{threshold_hsv, ColorSegmenter, Mask, BACKGROUND, FOREGROUND};
