// Values that flow between pipeline stages and out to telemetry.

use crate::config::ThresholdConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of target location on one mask.
///
/// `x`, `y` and `area` are only meaningful when `found` is true.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub found: bool,
    pub x: i32,
    pub y: i32,
    pub area: f64,
}

impl DetectionResult {
    pub fn not_found() -> Self {
        Self {
            found: false,
            x: 0,
            y: 0,
            area: 0.0,
        }
    }

    pub fn at(x: i32, y: i32, area: f64) -> Self {
        Self {
            found: true,
            x,
            y,
            area,
        }
    }
}

impl Default for DetectionResult {
    fn default() -> Self {
        Self::not_found()
    }
}

/// Read-only record of one tick, handed to telemetry sinks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub timestamp: DateTime<Utc>,
    pub frame_width: u32,
    pub frame_height: u32,
    pub detection: DetectionResult,
    pub center_x: i32,
    pub center_y: i32,
    /// Horizontal pixel error; zero when no target was found
    pub error_x_px: i32,
    /// Horizontal angular error in degrees; zero when no target was found
    pub angle_x_deg: f64,
    /// Area of the largest region seen this tick, even if it was rejected
    pub contour_area_px: f64,
    pub threshold: ThresholdConfig,
    pub raw_angle: f64,
    pub smoothed_angle: f64,
    /// Command actually written to the actuator this tick
    pub command_sent: Option<i32>,
}

impl TelemetrySnapshot {
    pub fn target_found(&self) -> bool {
        self.detection.found
    }
}
