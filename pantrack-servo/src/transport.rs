//! Actuator transports
//!
//! Wire format: one ASCII decimal integer in `[0, 180]` followed by `\n`
//! per command. Fire-and-forget on the tick path; replies are only read by
//! callers that ask for them through `read_reply`.

use crate::error::ServoError;
use std::io::Write;
use tracing::{debug, info, warn};

/// Lowest command the wire protocol accepts
pub const COMMAND_MIN: i32 = 0;
/// Highest command the wire protocol accepts
pub const COMMAND_MAX: i32 = 180;

/// Sink for integer actuator commands.
pub trait ActuatorTransport {
    /// Human-readable name for logs
    fn name(&self) -> &str;

    /// Transmit one command. The value is clamped to the wire range.
    fn send_angle(&mut self, angle: i32) -> Result<(), ServoError>;

    /// Read one reply line from the device, if it sent one before timing out.
    ///
    /// Write-only transports have nothing to read.
    fn read_reply(&mut self) -> Result<Option<String>, ServoError> {
        Ok(None)
    }
}

impl<T: ActuatorTransport + ?Sized> ActuatorTransport for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn send_angle(&mut self, angle: i32) -> Result<(), ServoError> {
        (**self).send_angle(angle)
    }

    fn read_reply(&mut self) -> Result<Option<String>, ServoError> {
        (**self).read_reply()
    }
}

/// Encode a command line, clamping into the wire range.
pub fn encode_command(angle: i32) -> String {
    format!("{}\n", angle.clamp(COMMAND_MIN, COMMAND_MAX))
}

/// Writes newline-terminated commands to any byte sink.
pub struct LineTransport<W: Write> {
    writer: W,
    name: String,
}

impl<W: Write> LineTransport<W> {
    pub fn new(writer: W, name: impl Into<String>) -> Self {
        Self {
            writer,
            name: name.into(),
        }
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.writer
    }
}

impl<W: Write> ActuatorTransport for LineTransport<W> {
    fn name(&self) -> &str {
        &self.name
    }

    fn send_angle(&mut self, angle: i32) -> Result<(), ServoError> {
        let line = encode_command(angle);
        self.writer
            .write_all(line.as_bytes())
            .and_then(|_| self.writer.flush())
            .map_err(|e| ServoError::Transport(format!("{}: {}", self.name, e)))?;
        debug!("{} <- {}", self.name, line.trim_end());
        Ok(())
    }
}

impl<W: Write> Drop for LineTransport<W> {
    fn drop(&mut self) {
        if let Err(e) = self.writer.flush() {
            warn!("Failed to flush {} on close: {}", self.name, e);
        }
    }
}

/// Logs commands instead of transmitting them. Keeps a record for inspection.
#[derive(Debug, Default)]
pub struct DryRunTransport {
    sent: Vec<i32>,
}

impl DryRunTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> &[i32] {
        &self.sent
    }
}

impl ActuatorTransport for DryRunTransport {
    fn name(&self) -> &str {
        "dry-run"
    }

    fn send_angle(&mut self, angle: i32) -> Result<(), ServoError> {
        let angle = angle.clamp(COMMAND_MIN, COMMAND_MAX);
        info!("dry-run command: {}", angle);
        self.sent.push(angle);
        Ok(())
    }
}

#[cfg(feature = "serial")]
pub use self::serial::SerialTransport;

#[cfg(feature = "serial")]
mod serial {
    use super::{ActuatorTransport, LineTransport};
    use crate::error::ServoError;
    use pantrack_core::TransportSettings;
    use serialport::SerialPort;
    use std::io::{ErrorKind, Read};
    use std::time::Duration;
    use tracing::{info, warn};

    /// Serial link to the actuator's microcontroller.
    ///
    /// Opening the port resets most boards, so `open` blocks for the
    /// configured settle delay before returning. The port closes on drop.
    pub struct SerialTransport {
        line: LineTransport<Box<dyn SerialPort>>,
    }

    impl SerialTransport {
        pub fn open(settings: &TransportSettings) -> Result<Self, ServoError> {
            let port = serialport::new(&settings.port, settings.baud_rate)
                .timeout(Duration::from_millis(settings.timeout_ms))
                .open()
                .map_err(|e| ServoError::Serial(format!("Failed to open {}: {}", settings.port, e)))?;

            info!(
                "Opened {} at {} baud, settling for {} ms",
                settings.port, settings.baud_rate, settings.settle_delay_ms
            );
            std::thread::sleep(Duration::from_millis(settings.settle_delay_ms));

            Ok(Self {
                line: LineTransport::new(port, settings.port.clone()),
            })
        }

        /// Names of serial ports visible to the OS.
        pub fn available_ports() -> Vec<String> {
            match serialport::available_ports() {
                Ok(ports) => ports.into_iter().map(|p| p.port_name).collect(),
                Err(e) => {
                    warn!("Could not enumerate serial ports: {}", e);
                    Vec::new()
                }
            }
        }
    }

    impl ActuatorTransport for SerialTransport {
        fn name(&self) -> &str {
            self.line.name()
        }

        fn send_angle(&mut self, angle: i32) -> Result<(), ServoError> {
            self.line.send_angle(angle)
        }

        fn read_reply(&mut self) -> Result<Option<String>, ServoError> {
            let port = self.line.get_mut();
            let mut buf = Vec::new();
            let mut byte = [0u8; 1];
            loop {
                match port.read(&mut byte) {
                    Ok(0) => break,
                    Ok(_) if byte[0] == b'\n' => break,
                    Ok(_) => buf.push(byte[0]),
                    Err(e) if e.kind() == ErrorKind::TimedOut => break,
                    Err(e) => return Err(ServoError::Serial(e.to_string())),
                }
            }
            let reply = String::from_utf8_lossy(&buf).trim().to_string();
            Ok(if reply.is_empty() { None } else { Some(reply) })
        }
    }

    impl Drop for SerialTransport {
        fn drop(&mut self) {
            info!("Closing serial port {}", self.line.name());
        }
    }
}
