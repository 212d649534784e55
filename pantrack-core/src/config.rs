// Configuration for the pantrack servo loop.
//
// One `ServoConfig` value is built at startup and then handed out once per
// tick by whatever owns tuning (file, trackbars). The pipeline never mutates it.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Hard floor on accepted blob area, applied on top of `ThresholdConfig::min_area`.
pub const MIN_AREA_FLOOR: f64 = 50.0;

/// Area a candidate region must reach for a given `min_area` setting.
pub fn effective_min_area(min_area_setting: u32) -> f64 {
    MIN_AREA_FLOOR.max(min_area_setting as f64)
}

/// Highest hue value on the half-degree scale.
pub const HUE_MAX: u8 = 179;

/// HSV segmentation bounds plus the blob-area acceptance setting.
///
/// Hue uses the 0-179 half-degree scale, saturation and value use 0-255.
/// Inverted pairs are legal input: tuning sliders pass through them while
/// being dragged. Call [`ThresholdConfig::normalized`] before use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub h_min: u8,
    pub h_max: u8,
    pub s_min: u8,
    pub s_max: u8,
    pub v_min: u8,
    pub v_max: u8,
    pub min_area: u32,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        // Yellow-green through green.
        Self {
            h_min: 20,
            h_max: 95,
            s_min: 50,
            s_max: 255,
            v_min: 40,
            v_max: 255,
            min_area: 1200,
        }
    }
}

impl ThresholdConfig {
    /// Returns a copy with every min/max pair ordered.
    pub fn normalized(&self) -> Self {
        let (h_min, h_max) = ordered(self.h_min, self.h_max);
        let (s_min, s_max) = ordered(self.s_min, self.s_max);
        let (v_min, v_max) = ordered(self.v_min, self.v_max);
        Self {
            h_min,
            h_max,
            s_min,
            s_max,
            v_min,
            v_max,
            min_area: self.min_area,
        }
    }

    /// Inclusive range test on all three channels.
    ///
    /// Assumes `self` is normalized.
    #[inline]
    pub fn contains(&self, h: u8, s: u8, v: u8) -> bool {
        (self.h_min..=self.h_max).contains(&h)
            && (self.s_min..=self.s_max).contains(&s)
            && (self.v_min..=self.v_max).contains(&v)
    }
}

fn ordered(a: u8, b: u8) -> (u8, u8) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Capture device settings and the camera's horizontal field of view.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// USB camera device index (0, 1, 2, etc.)
    pub index: u32,
    /// Requested resolution (width, height)
    pub resolution: (u32, u32),
    /// Horizontal field of view in degrees
    pub fov_degrees: f64,
    /// Mirror frames horizontally so on-screen motion matches the operator's
    pub mirror: bool,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            resolution: (1280, 720),
            fov_degrees: 60.0,
            mirror: true,
        }
    }
}

/// Sign applied to the proportional correction.
///
/// Which one is right depends on how the camera is mounted on the actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Normal,
    Inverted,
}

impl Direction {
    pub fn sign(self) -> f64 {
        match self {
            Direction::Normal => 1.0,
            Direction::Inverted => -1.0,
        }
    }
}

impl Default for Direction {
    fn default() -> Self {
        Direction::Normal
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Proportional gain (actuator units per degree of error)
    pub gain: f64,
    pub direction: Direction,
    /// Errors at or below this magnitude leave the raw angle alone
    pub deadband_degrees: f64,
    /// Exponential smoothing factor in [0, 1]; 1 disables smoothing
    pub alpha: f64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            gain: 0.5,
            direction: Direction::Normal,
            deadband_degrees: 1.0,
            alpha: 0.35,
        }
    }
}

/// Actuator travel limits and startup position, in actuator-native units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActuatorLimits {
    pub min: f64,
    pub center: f64,
    pub max: f64,
}

impl Default for ActuatorLimits {
    fn default() -> Self {
        Self {
            min: 0.0,
            center: 90.0,
            max: 180.0,
        }
    }
}

impl ActuatorLimits {
    #[inline]
    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.min).min(self.max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Commands closer than this to the last sent one are dropped
    pub min_step_units: f64,
    /// Minimum spacing between two transmitted commands
    pub min_interval_secs: f64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            min_step_units: 1.0,
            min_interval_secs: 0.05,
        }
    }
}

impl GateConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_secs_f64(self.min_interval_secs.max(0.0))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    /// Serial device path (e.g. /dev/ttyACM0, COM5)
    pub port: String,
    pub baud_rate: u32,
    /// Write timeout in milliseconds
    pub timeout_ms: u64,
    /// Delay after opening before the first command; the controller resets on open
    pub settle_delay_ms: u64,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            port: "/dev/ttyACM0".to_string(),
            baud_rate: 115_200,
            timeout_ms: 50,
            settle_delay_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TelemetryFormat {
    Csv,
    Jsonl,
    Off,
}

impl Default for TelemetryFormat {
    fn default() -> Self {
        TelemetryFormat::Csv
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub format: TelemetryFormat,
    pub directory: PathBuf,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            format: TelemetryFormat::Csv,
            directory: PathBuf::from("logs"),
        }
    }
}

/// Complete configuration for one servo loop.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServoConfig {
    pub threshold: ThresholdConfig,
    pub camera: CameraConfig,
    pub control: ControlConfig,
    pub gate: GateConfig,
    pub actuator: ActuatorLimits,
    pub transport: TransportSettings,
    pub telemetry: TelemetryConfig,
}

impl ServoConfig {
    /// Load configuration from a TOML or JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_str(&content)
    }

    /// Parse configuration text, trying TOML first and then JSON.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        let toml_err = match toml::from_str::<ServoConfig>(content) {
            Ok(config) => return Ok(config),
            Err(e) => e,
        };

        if let Ok(config) = serde_json::from_str::<ServoConfig>(content) {
            return Ok(config);
        }

        Err(Error::Parse(toml_err.to_string()))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Overlay `PANTRACK_*` environment variables onto this configuration.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Overlay variables from an arbitrary lookup. Unparseable values are ignored.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(index) = lookup("PANTRACK_CAMERA").and_then(|v| v.parse().ok()) {
            self.camera.index = index;
        }

        if let Some(port) = lookup("PANTRACK_PORT") {
            self.transport.port = port;
        }

        if let Some(baud) = lookup("PANTRACK_BAUD").and_then(|v| v.parse().ok()) {
            self.transport.baud_rate = baud;
        }

        if let Some(dir) = lookup("PANTRACK_TELEMETRY_DIR") {
            self.telemetry.directory = PathBuf::from(dir);
        }
    }

    /// Reject numeric settings the control loop cannot work with.
    ///
    /// Inverted threshold pairs are not errors; they are normalized per tick.
    pub fn validate(&self) -> Result<()> {
        if self.threshold.h_min > HUE_MAX || self.threshold.h_max > HUE_MAX {
            return Err(Error::Configuration(format!(
                "hue bounds must be within 0..={}",
                HUE_MAX
            )));
        }

        if !(self.camera.fov_degrees.is_finite() && self.camera.fov_degrees > 0.0) {
            return Err(Error::Configuration(
                "camera.fov_degrees must be > 0".to_string(),
            ));
        }

        if self.camera.resolution.0 == 0 || self.camera.resolution.1 == 0 {
            return Err(Error::Configuration(
                "camera.resolution must be non-zero".to_string(),
            ));
        }

        if !(self.control.gain.is_finite() && self.control.gain > 0.0) {
            return Err(Error::Configuration("control.gain must be > 0".to_string()));
        }

        if !(self.control.deadband_degrees.is_finite() && self.control.deadband_degrees >= 0.0) {
            return Err(Error::Configuration(
                "control.deadband_degrees must be >= 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.control.alpha) {
            return Err(Error::Configuration(
                "control.alpha must be within [0, 1]".to_string(),
            ));
        }

        let a = &self.actuator;
        if !(a.min.is_finite() && a.max.is_finite() && a.center.is_finite()) {
            return Err(Error::Configuration(
                "actuator limits must be finite".to_string(),
            ));
        }
        if a.min > a.max {
            return Err(Error::Configuration(
                "actuator.min cannot be greater than actuator.max".to_string(),
            ));
        }
        if a.center < a.min || a.center > a.max {
            return Err(Error::Configuration(
                "actuator.center must lie within [actuator.min, actuator.max]".to_string(),
            ));
        }

        if a.min.ceil().max(0.0) > a.max.floor().min(180.0) {
            return Err(Error::Configuration(
                "actuator range must contain a whole command within 0..=180".to_string(),
            ));
        }

        if !(self.gate.min_step_units.is_finite() && self.gate.min_step_units >= 0.0) {
            return Err(Error::Configuration(
                "gate.min_step_units must be >= 0".to_string(),
            ));
        }
        if !(self.gate.min_interval_secs.is_finite() && self.gate.min_interval_secs >= 0.0) {
            return Err(Error::Configuration(
                "gate.min_interval_secs must be >= 0".to_string(),
            ));
        }

        if self.transport.baud_rate == 0 {
            return Err(Error::Configuration(
                "transport.baud_rate must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}
