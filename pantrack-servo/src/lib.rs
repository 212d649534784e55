//! pantrack-servo: from angular error to actuator commands
//!
//! Holds the stateful half of the servo: the smoothing control law, the
//! command gate, actuator transports, telemetry sinks, and the tick loop
//! that ties them to a frame source.

pub mod control;
pub mod error;
pub mod gate;
pub mod pipeline;
pub mod runner;
pub mod telemetry;
pub mod transport;

pub use control::{ControlLaw, ControlState};
pub use error::ServoError;
pub use gate::{CommandGate, GateDecision, GateState};
pub use pipeline::ServoPipeline;
pub use runner::{ConfigSource, Headless, LoopControl, LoopSummary, ServoLoop, StaticConfig, TickObserver};
pub use telemetry::{open_sink, CsvSink, JsonlSink, MemorySink, NullSink, TelemetrySink};
#[cfg(feature = "serial")]
pub use transport::SerialTransport;
pub use transport::{ActuatorTransport, DryRunTransport, LineTransport};
