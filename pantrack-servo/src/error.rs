//! Error types for pantrack-servo

use pantrack_eye::VisionError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServoError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Serial port error: {0}")]
    Serial(String),

    #[error("Telemetry error: {0}")]
    Telemetry(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Vision error: {0}")]
    Vision(#[from] VisionError),

    #[error("Core error: {0}")]
    Core(#[from] pantrack_core::Error),
}

#[cfg(feature = "serial")]
impl From<serialport::Error> for ServoError {
    fn from(err: serialport::Error) -> Self {
        ServoError::Serial(err.to_string())
    }
}

impl From<serde_json::Error> for ServoError {
    fn from(err: serde_json::Error) -> Self {
        ServoError::Telemetry(err.to_string())
    }
}
