//! pantrack-core: shared types for the pantrack visual servo
//!
//! Holds the configuration model, the error type, and the per-tick values
//! (`DetectionResult`, `TelemetrySnapshot`) that cross crate boundaries.

pub mod config;
pub mod error;
pub mod types;

pub use config::{
    effective_min_area, ActuatorLimits, CameraConfig, ControlConfig, Direction, GateConfig,
    ServoConfig, TelemetryConfig, TelemetryFormat, ThresholdConfig, TransportSettings,
    MIN_AREA_FLOOR,
};
pub use error::{Error, Result};
pub use types::{DetectionResult, TelemetrySnapshot};
