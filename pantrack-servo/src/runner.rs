//! The tick loop: acquire, process, record, poll, repeat.

use crate::error::ServoError;
use crate::pipeline::ServoPipeline;
use crate::telemetry::TelemetrySink;
use crate::transport::ActuatorTransport;
use image::RgbImage;
use pantrack_core::{ServoConfig, TelemetrySnapshot};
use pantrack_eye::{FrameSource, Mask, VisionError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Supplies the configuration for each tick.
pub trait ConfigSource {
    fn current(&mut self) -> ServoConfig;
}

/// A configuration that never changes.
pub struct StaticConfig(pub ServoConfig);

impl ConfigSource for StaticConfig {
    fn current(&mut self) -> ServoConfig {
        self.0.clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopControl {
    Continue,
    Quit,
}

/// Sees every processed frame after the pipeline ran. Preview windows and
/// keyboard handling live behind this.
pub trait TickObserver {
    /// Whether the observer wants the segmentation mask.
    fn wants_mask(&self) -> bool {
        false
    }

    fn observe(
        &mut self,
        frame: &RgbImage,
        mask: Option<&Mask>,
        snapshot: &TelemetrySnapshot,
    ) -> Result<LoopControl, ServoError>;
}

/// Observer for headless runs.
pub struct Headless;

impl TickObserver for Headless {
    fn observe(
        &mut self,
        _frame: &RgbImage,
        _mask: Option<&Mask>,
        _snapshot: &TelemetrySnapshot,
    ) -> Result<LoopControl, ServoError> {
        Ok(LoopControl::Continue)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopSummary {
    pub frames: u64,
    pub detections: u64,
    pub commands_sent: u64,
}

/// Single-threaded servo loop over a frame source and a transport.
///
/// Stop requests are honored between ticks. The source and transport are
/// owned, so both are released when the loop is dropped, whatever the exit path.
pub struct ServoLoop<F, T> {
    source: F,
    transport: T,
    sink: Box<dyn TelemetrySink>,
    pipeline: ServoPipeline,
    stop: Arc<AtomicBool>,
    max_frames: Option<u64>,
}

impl<F, T> ServoLoop<F, T>
where
    F: FrameSource,
    T: ActuatorTransport,
{
    pub fn new(source: F, transport: T, sink: Box<dyn TelemetrySink>, config: &ServoConfig) -> Self {
        Self {
            source,
            transport,
            sink,
            pipeline: ServoPipeline::new(config),
            stop: Arc::new(AtomicBool::new(false)),
            max_frames: None,
        }
    }

    /// Stop after this many frames.
    pub fn with_max_frames(mut self, max_frames: Option<u64>) -> Self {
        self.max_frames = max_frames;
        self
    }

    /// Handle that ends the loop before the next tick when set.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn pipeline(&self) -> &ServoPipeline {
        &self.pipeline
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Run until the source ends, the observer quits, a stop is requested
    /// or the frame limit is reached.
    ///
    /// A frame source error other than end-of-stream is returned. Transport
    /// and telemetry failures are logged and the loop carries on.
    pub fn run<C, O>(&mut self, config: &mut C, observer: &mut O) -> Result<LoopSummary, ServoError>
    where
        C: ConfigSource + ?Sized,
        O: TickObserver + ?Sized,
    {
        let mut summary = LoopSummary::default();
        self.pipeline.retain_masks(observer.wants_mask());

        let result = self.run_ticks(config, observer, &mut summary);

        if let Err(e) = self.sink.flush() {
            warn!("Failed to flush telemetry: {}", e);
        }

        info!(
            frames = summary.frames,
            detections = summary.detections,
            commands = summary.commands_sent,
            "servo loop finished"
        );
        result.map(|_| summary)
    }

    fn run_ticks<C, O>(
        &mut self,
        config: &mut C,
        observer: &mut O,
        summary: &mut LoopSummary,
    ) -> Result<(), ServoError>
    where
        C: ConfigSource + ?Sized,
        O: TickObserver + ?Sized,
    {
        loop {
            if self.stop.load(Ordering::SeqCst) {
                info!("Stop requested");
                return Ok(());
            }
            if self.max_frames.is_some_and(|max| summary.frames >= max) {
                info!("Frame limit reached");
                return Ok(());
            }

            let frame = match self.source.next_frame() {
                Ok(frame) => frame,
                Err(VisionError::EndOfStream) => {
                    info!("Frame source exhausted");
                    return Ok(());
                }
                Err(e) => {
                    error!("Frame acquisition failed: {}", e);
                    return Err(e.into());
                }
            };

            let current = config.current();
            let snapshot = self.pipeline.tick(&frame, &current, &mut self.transport, Instant::now());

            summary.frames += 1;
            if snapshot.target_found() {
                summary.detections += 1;
            }
            if snapshot.command_sent.is_some() {
                summary.commands_sent += 1;
            }

            if let Err(e) = self.sink.record(&snapshot) {
                warn!("Failed to record telemetry: {}", e);
            }

            if observer.observe(&frame, self.pipeline.last_mask(), &snapshot)? == LoopControl::Quit {
                info!("Quit requested");
                return Ok(());
            }
        }
    }
}
