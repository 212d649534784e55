//! Proportional correction with exponential smoothing

use pantrack_core::{ActuatorLimits, ControlConfig, DetectionResult};
use tracing::trace;

/// Loop-carried actuator angles. Seeded once at startup, updated once per tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlState {
    pub raw_angle: f64,
    pub smoothed_angle: f64,
}

impl ControlState {
    pub fn seeded(limits: &ActuatorLimits) -> Self {
        let center = limits.clamp(limits.center);
        Self {
            raw_angle: center,
            smoothed_angle: center,
        }
    }
}

/// Turns an angular error into a desired actuator angle.
#[derive(Debug, Clone, Copy, Default)]
pub struct ControlLaw;

impl ControlLaw {
    pub fn new() -> Self {
        Self
    }

    /// Advance `state` by one tick and return the smoothed angle.
    ///
    /// Both angles are pulled into `limits` every tick, so narrowed limits
    /// take effect even while no target is visible. Otherwise, without a
    /// target, the previous smoothed angle is returned.
    pub fn update(
        &self,
        state: &mut ControlState,
        detection: &DetectionResult,
        angle_error: f64,
        config: &ControlConfig,
        limits: &ActuatorLimits,
    ) -> f64 {
        state.raw_angle = limits.clamp(state.raw_angle);
        state.smoothed_angle = limits.clamp(state.smoothed_angle);
        if !detection.found {
            return state.smoothed_angle;
        }

        if angle_error.abs() > config.deadband_degrees {
            state.raw_angle -= config.direction.sign() * config.gain * angle_error;
        }
        state.raw_angle = limits.clamp(state.raw_angle);

        let smoothed = (1.0 - config.alpha) * state.smoothed_angle + config.alpha * state.raw_angle;
        state.smoothed_angle = limits.clamp(smoothed);

        trace!(
            angle_error,
            raw = state.raw_angle,
            smoothed = state.smoothed_angle,
            "control update"
        );
        state.smoothed_angle
    }
}
