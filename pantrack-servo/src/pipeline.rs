//! One frame through every stage: segment, locate, convert, control, gate.

use crate::control::{ControlLaw, ControlState};
use crate::gate::{CommandGate, GateState};
use crate::transport::ActuatorTransport;
use chrono::Utc;
use image::RgbImage;
use pantrack_core::{ServoConfig, TelemetrySnapshot};
use pantrack_eye::processing::{frame_center, pixel_error, to_angle};
use pantrack_eye::{ColorSegmenter, Mask, TargetLocator};
use std::time::Instant;
use tracing::debug;

/// Owns the loop-carried state and the stages that use it.
pub struct ServoPipeline {
    segmenter: ColorSegmenter,
    locator: TargetLocator,
    law: ControlLaw,
    control: ControlState,
    gate: CommandGate,
    last_mask: Option<Mask>,
    keep_mask: bool,
}

impl ServoPipeline {
    /// Seed the control state at the configured actuator center.
    pub fn new(config: &ServoConfig) -> Self {
        Self {
            segmenter: ColorSegmenter::new(),
            locator: TargetLocator::new(),
            law: ControlLaw::new(),
            control: ControlState::seeded(&config.actuator),
            gate: CommandGate::new(),
            last_mask: None,
            keep_mask: false,
        }
    }

    /// Retain each tick's mask for display.
    pub fn retain_masks(&mut self, keep: bool) {
        self.keep_mask = keep;
        if !keep {
            self.last_mask = None;
        }
    }

    pub fn control_state(&self) -> &ControlState {
        &self.control
    }

    pub fn gate_state(&self) -> &GateState {
        self.gate.state()
    }

    pub fn last_mask(&self) -> Option<&Mask> {
        self.last_mask.as_ref()
    }

    /// Process one frame and possibly send one command.
    pub fn tick<T>(
        &mut self,
        frame: &RgbImage,
        config: &ServoConfig,
        transport: &mut T,
        now: Instant,
    ) -> TelemetrySnapshot
    where
        T: ActuatorTransport + ?Sized,
    {
        let threshold = config.threshold.normalized();
        let (width, height) = frame.dimensions();
        let (center_x, center_y) = frame_center(width, height);

        let mask = self.segmenter.segment(frame, &threshold);
        let detection = self.locator.locate(&mask, threshold.min_area);

        let (error_x_px, angle_x_deg) = if detection.found {
            (
                pixel_error(detection.x, center_x),
                to_angle(detection.x, center_x, width, config.camera.fov_degrees),
            )
        } else {
            (0, 0.0)
        };

        let candidate = self.law.update(
            &mut self.control,
            &detection,
            angle_x_deg,
            &config.control,
            &config.actuator,
        );
        let command_sent =
            self.gate
                .maybe_send(transport, candidate, &config.gate, &config.actuator, now);

        debug!(
            found = detection.found,
            x = detection.x,
            angle_x_deg,
            smoothed = self.control.smoothed_angle,
            sent = ?command_sent,
            "tick"
        );

        if self.keep_mask {
            self.last_mask = Some(mask);
        }

        TelemetrySnapshot {
            timestamp: Utc::now(),
            frame_width: width,
            frame_height: height,
            detection,
            center_x,
            center_y,
            error_x_px,
            angle_x_deg,
            contour_area_px: detection.area,
            threshold,
            raw_angle: self.control.raw_angle,
            smoothed_angle: self.control.smoothed_angle,
            command_sent,
        }
    }
}
