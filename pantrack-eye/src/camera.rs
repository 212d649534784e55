//! Frame acquisition
//!
//! `FrameSource` is the only blocking call in a tick. Implementations here:
//! `ReplaySource` (in-memory or image files), `FrameReceiver` (the consumer
//! side of a capture thread) and, with the `opencv` feature, `OpenCvCamera`.

use crate::error::VisionError;
use crossbeam_channel::{bounded, select, Receiver, Sender, TrySendError};
use image::{imageops, RgbImage};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Blocking source of RGB frames.
///
/// An `Err` ends the tick loop; retry policy belongs to the implementation.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<RgbImage, VisionError>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self) -> Result<RgbImage, VisionError> {
        (**self).next_frame()
    }
}

/// Plays back a fixed sequence of frames, then reports `EndOfStream`.
pub struct ReplaySource {
    frames: VecDeque<RgbImage>,
    pending: VecDeque<PathBuf>,
    mirror: bool,
}

impl ReplaySource {
    pub fn from_frames(frames: impl IntoIterator<Item = RgbImage>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
            pending: VecDeque::new(),
            mirror: false,
        }
    }

    /// Replay every PNG/JPEG in `dir`, in file-name order. Files are decoded lazily.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, VisionError> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir.as_ref())?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| is_image_path(p))
            .collect();
        paths.sort();

        if paths.is_empty() {
            return Err(VisionError::Camera(format!(
                "No image files in {}",
                dir.as_ref().display()
            )));
        }

        info!("Replaying {} frames from {}", paths.len(), dir.as_ref().display());
        Ok(Self {
            frames: VecDeque::new(),
            pending: paths.into(),
            mirror: false,
        })
    }

    pub fn with_mirror(mut self, mirror: bool) -> Self {
        self.mirror = mirror;
        self
    }

    pub fn remaining(&self) -> usize {
        self.frames.len() + self.pending.len()
    }
}

impl FrameSource for ReplaySource {
    fn next_frame(&mut self) -> Result<RgbImage, VisionError> {
        let frame = if let Some(frame) = self.frames.pop_front() {
            frame
        } else if let Some(path) = self.pending.pop_front() {
            debug!("Loading frame {}", path.display());
            image::open(&path)?.to_rgb8()
        } else {
            return Err(VisionError::EndOfStream);
        };

        Ok(if self.mirror {
            imageops::flip_horizontal(&frame)
        } else {
            frame
        })
    }
}

fn is_image_path(path: &Path) -> bool {
    matches!(
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref(),
        Some("png") | Some("jpg") | Some("jpeg")
    )
}

/// Create a single-slot, drop-oldest frame hand-off between a capture thread
/// and the tick loop.
pub fn frame_handoff() -> (FrameSender, FrameReceiver) {
    let (tx, rx) = bounded(1);
    let (done_tx, done_rx) = bounded(1);
    let alive = Arc::new(());
    (
        FrameSender {
            tx,
            drain: rx.clone(),
            done: done_tx,
            consumer: Arc::downgrade(&alive),
        },
        FrameReceiver {
            rx,
            done: done_rx,
            pending: None,
            _alive: alive,
        },
    )
}

/// Producer side of [`frame_handoff`].
pub struct FrameSender {
    tx: Sender<RgbImage>,
    // The sender keeps a receiver handle to evict stale frames, so the
    // channel never disconnects on its own; `consumer` tracks the real one.
    drain: Receiver<RgbImage>,
    done: Sender<VisionError>,
    consumer: Weak<()>,
}

impl FrameSender {
    /// Publish a frame, discarding any frame the consumer has not taken yet.
    ///
    /// Returns `false` once the consumer is gone.
    pub fn publish(&self, frame: RgbImage) -> bool {
        if self.consumer.upgrade().is_none() {
            return false;
        }
        let mut frame = frame;
        loop {
            match self.tx.try_send(frame) {
                Ok(()) => return true,
                Err(TrySendError::Full(back)) => {
                    // Stale frame; the consumer only wants the newest.
                    let _ = self.drain.try_recv();
                    frame = back;
                }
                Err(TrySendError::Disconnected(_)) => return false,
            }
        }
    }

    /// End the stream. The consumer sees `reason` after the last published frame.
    pub fn finish(self, reason: VisionError) {
        let _ = self.done.try_send(reason);
    }
}

/// Consumer side of [`frame_handoff`]. Blocks until a frame is available.
pub struct FrameReceiver {
    rx: Receiver<RgbImage>,
    done: Receiver<VisionError>,
    // Terminal error that arrived while a frame was still waiting
    pending: Option<VisionError>,
    _alive: Arc<()>,
}

impl FrameReceiver {
    pub fn try_latest(&self) -> Option<RgbImage> {
        self.rx.try_recv().ok()
    }

    fn terminal(&self) -> VisionError {
        self.done
            .try_recv()
            .unwrap_or_else(|_| VisionError::Camera("Capture thread stopped".to_string()))
    }
}

impl FrameSource for FrameReceiver {
    fn next_frame(&mut self) -> Result<RgbImage, VisionError> {
        if let Ok(frame) = self.rx.try_recv() {
            return Ok(frame);
        }
        if let Some(reason) = self.pending.take() {
            return Err(reason);
        }

        let (rx, done) = (self.rx.clone(), self.done.clone());
        select! {
            recv(rx) -> frame => frame.map_err(|_| self.terminal()),
            recv(done) -> reason => {
                let reason = reason
                    .unwrap_or_else(|_| VisionError::Camera("Capture thread stopped".to_string()));
                // The last frame is published before the stream ends.
                match rx.try_recv() {
                    Ok(frame) => {
                        self.pending = Some(reason);
                        Ok(frame)
                    }
                    Err(_) => Err(reason),
                }
            }
        }
    }
}

/// Run `source` on its own thread, handing frames over with drop-oldest
/// semantics.
///
/// The thread exits when the source fails or the receiver is dropped. The
/// source's final error, `EndOfStream` included, reaches the receiver.
pub fn spawn_capture<S>(mut source: S) -> Result<(FrameReceiver, JoinHandle<()>), VisionError>
where
    S: FrameSource + Send + 'static,
{
    let (sender, receiver) = frame_handoff();
    let handle = thread::Builder::new()
        .name("pantrack-capture".to_string())
        .spawn(move || loop {
            match source.next_frame() {
                Ok(frame) => {
                    if !sender.publish(frame) {
                        debug!("Frame receiver dropped, stopping capture thread");
                        break;
                    }
                }
                Err(VisionError::EndOfStream) => {
                    info!("Capture source exhausted");
                    sender.finish(VisionError::EndOfStream);
                    break;
                }
                Err(e) => {
                    warn!("Capture thread stopping: {}", e);
                    sender.finish(e);
                    break;
                }
            }
        })?;
    Ok((receiver, handle))
}

#[cfg(feature = "opencv")]
pub use self::opencv_capture::OpenCvCamera;

#[cfg(feature = "opencv")]
mod opencv_capture {
    use super::FrameSource;
    use crate::error::VisionError;
    use image::RgbImage;
    use opencv::{
        core::{self, Mat},
        imgproc,
        prelude::*,
        videoio::{VideoCapture, CAP_ANY, CAP_PROP_FRAME_HEIGHT, CAP_PROP_FRAME_WIDTH},
    };
    use pantrack_core::CameraConfig;
    use tracing::{info, warn};

    /// USB webcam capture through OpenCV.
    ///
    /// The device is released when the value is dropped.
    pub struct OpenCvCamera {
        capture: VideoCapture,
        index: u32,
        mirror: bool,
    }

    impl OpenCvCamera {
        pub fn open(config: &CameraConfig) -> Result<Self, VisionError> {
            let mut capture = VideoCapture::new(config.index as i32, CAP_ANY)
                .map_err(|e| VisionError::Camera(format!("Failed to open camera {}: {}", config.index, e)))?;

            if !capture.is_opened()? {
                return Err(VisionError::Camera(format!(
                    "Camera {} failed to open",
                    config.index
                )));
            }

            let (width, height) = config.resolution;
            if !capture.set(CAP_PROP_FRAME_WIDTH, width as f64)?
                || !capture.set(CAP_PROP_FRAME_HEIGHT, height as f64)?
            {
                warn!("Camera {} ignored requested resolution {}x{}", config.index, width, height);
            }

            info!("Camera {} opened at requested {}x{}", config.index, width, height);
            Ok(Self {
                capture,
                index: config.index,
                mirror: config.mirror,
            })
        }

        /// Read the next frame as an OpenCV BGR `Mat`, mirrored if configured.
        pub fn read_mat(&mut self) -> Result<Mat, VisionError> {
            let mut frame = Mat::default();
            let ok = self.capture.read(&mut frame)?;
            if !ok || frame.empty() {
                return Err(VisionError::Camera(format!(
                    "Failed to read frame from camera {}",
                    self.index
                )));
            }

            if self.mirror {
                let mut flipped = Mat::default();
                core::flip(&frame, &mut flipped, 1)?;
                Ok(flipped)
            } else {
                Ok(frame)
            }
        }
    }

    /// Convert a BGR `Mat` to an owned `RgbImage`.
    pub fn mat_to_rgb(mat: &Mat) -> Result<RgbImage, VisionError> {
        let mut rgb = Mat::default();
        imgproc::cvt_color(mat, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;
        let (width, height) = (rgb.cols() as u32, rgb.rows() as u32);
        let data = rgb.data_bytes()?.to_vec();
        RgbImage::from_raw(width, height, data)
            .ok_or_else(|| VisionError::Processing("Frame buffer size mismatch".to_string()))
    }

    impl FrameSource for OpenCvCamera {
        fn next_frame(&mut self) -> Result<RgbImage, VisionError> {
            let mat = self.read_mat()?;
            mat_to_rgb(&mat)
        }
    }

    impl Drop for OpenCvCamera {
        fn drop(&mut self) {
            if let Err(e) = self.capture.release() {
                warn!("Failed to release camera {}: {}", self.index, e);
            } else {
                info!("Camera {} released", self.index);
            }
        }
    }
}

#[cfg(feature = "opencv")]
pub use self::opencv_capture::mat_to_rgb;
