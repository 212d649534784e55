//! Command gate: rate and step limiting in front of the actuator link

use crate::transport::{ActuatorTransport, COMMAND_MAX, COMMAND_MIN};
use pantrack_core::{ActuatorLimits, GateConfig};
use std::time::Instant;
use tracing::{trace, warn};

/// What was last transmitted, and when. Both are `None` until the first send.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GateState {
    pub last_sent_angle: Option<i32>,
    pub last_sent_at: Option<Instant>,
}

/// Outcome of [`CommandGate::evaluate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Transmit this (rounded, clamped) command
    Send(i32),
    /// Too close to the last transmitted value
    SuppressedStep,
    /// Too soon after the last transmission
    SuppressedInterval,
}

#[derive(Debug, Clone, Default)]
pub struct CommandGate {
    state: GateState,
}

impl CommandGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &GateState {
        &self.state
    }

    /// Decide whether `candidate` should go out. Does not touch state.
    ///
    /// The step check compares the unrounded candidate with the last
    /// integer actually sent.
    pub fn evaluate(
        &self,
        candidate: f64,
        config: &GateConfig,
        limits: &ActuatorLimits,
        now: Instant,
    ) -> GateDecision {
        if let Some(last) = self.state.last_sent_angle {
            if (candidate - last as f64).abs() < config.min_step_units {
                return GateDecision::SuppressedStep;
            }
        }

        if let Some(at) = self.state.last_sent_at {
            if now.saturating_duration_since(at) < config.min_interval() {
                return GateDecision::SuppressedInterval;
            }
        }

        GateDecision::Send(to_command(candidate, limits))
    }

    /// Record a successful transmission.
    pub fn commit(&mut self, sent: i32, now: Instant) {
        self.state = GateState {
            last_sent_angle: Some(sent),
            last_sent_at: Some(now),
        };
    }

    /// Evaluate, transmit and commit. Returns the command written, if any.
    ///
    /// A failed write is logged and leaves the gate as it was, so the next
    /// tick retries.
    pub fn maybe_send<T>(
        &mut self,
        transport: &mut T,
        candidate: f64,
        config: &GateConfig,
        limits: &ActuatorLimits,
        now: Instant,
    ) -> Option<i32>
    where
        T: ActuatorTransport + ?Sized,
    {
        match self.evaluate(candidate, config, limits, now) {
            GateDecision::Send(command) => match transport.send_angle(command) {
                Ok(()) => {
                    self.commit(command, now);
                    Some(command)
                }
                Err(e) => {
                    warn!("Failed to send command {} on {}: {}", command, transport.name(), e);
                    None
                }
            },
            decision => {
                trace!(candidate, ?decision, "command suppressed");
                None
            }
        }
    }
}

/// Round to the nearest whole unit (half away from zero), then clamp to the
/// whole units inside both the actuator limits and the wire range.
pub fn to_command(candidate: f64, limits: &ActuatorLimits) -> i32 {
    let lo = limits.min.ceil().max(COMMAND_MIN as f64);
    let hi = limits.max.floor().min(COMMAND_MAX as f64);
    // max/min rather than clamp: limits without a whole unit inside must not panic.
    candidate.round().min(hi).max(lo) as i32
}
