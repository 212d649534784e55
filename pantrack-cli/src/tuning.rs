//! Interactive threshold tuning and preview windows (OpenCV HighGUI)
//!
//! Trackbar positions are polled once per tick; no callbacks are registered.

use image::RgbImage;
use opencv::core::{Mat, Point, Scalar, Vec3b};
use opencv::{highgui, imgproc, prelude::*};
use pantrack_core::{ServoConfig, TelemetrySnapshot};
use pantrack_eye::Mask;
use pantrack_servo::{ConfigSource, LoopControl, ServoError, TickObserver};
use tracing::warn;

const WINDOW_TUNE: &str = "pantrack tuning";
const WINDOW_MAIN: &str = "pantrack";
const WINDOW_MASK: &str = "pantrack mask";

const KEY_ESC: i32 = 27;
const MIN_AREA_SLIDER_MAX: i32 = 30_000;

/// (label, slider maximum)
const SLIDERS: [(&str, i32); 7] = [
    ("H Min", 179),
    ("H Max", 179),
    ("S Min", 255),
    ("S Max", 255),
    ("V Min", 255),
    ("V Max", 255),
    ("Min Area", MIN_AREA_SLIDER_MAX),
];

/// Threshold settings read from trackbars; everything else from the base config.
pub struct TrackbarConfig {
    base: ServoConfig,
}

impl TrackbarConfig {
    pub fn create(base: ServoConfig) -> opencv::Result<Self> {
        highgui::named_window(WINDOW_TUNE, highgui::WINDOW_NORMAL)?;
        let t = &base.threshold;
        let initial = [
            t.h_min as i32,
            t.h_max as i32,
            t.s_min as i32,
            t.s_max as i32,
            t.v_min as i32,
            t.v_max as i32,
            (t.min_area as i32).min(MIN_AREA_SLIDER_MAX),
        ];
        for ((label, max), value) in SLIDERS.iter().zip(initial) {
            highgui::create_trackbar(label, WINDOW_TUNE, None, *max, None)?;
            highgui::set_trackbar_pos(label, WINDOW_TUNE, value)?;
        }
        Ok(Self { base })
    }

    fn read(&self) -> opencv::Result<ServoConfig> {
        let pos = |label: &str| highgui::get_trackbar_pos(label, WINDOW_TUNE);
        let byte = |label: &str| -> opencv::Result<u8> { Ok(pos(label)?.clamp(0, 255) as u8) };

        let mut config = self.base.clone();
        config.threshold.h_min = byte("H Min")?;
        config.threshold.h_max = byte("H Max")?;
        config.threshold.s_min = byte("S Min")?;
        config.threshold.s_max = byte("S Max")?;
        config.threshold.v_min = byte("V Min")?;
        config.threshold.v_max = byte("V Max")?;
        config.threshold.min_area = pos("Min Area")?.max(0) as u32;
        Ok(config)
    }
}

impl ConfigSource for TrackbarConfig {
    fn current(&mut self) -> ServoConfig {
        match self.read() {
            Ok(config) => config,
            Err(e) => {
                warn!("Failed to read trackbars, using last file config: {}", e);
                self.base.clone()
            }
        }
    }
}

/// Shows the annotated frame and the mask; `q` or ESC quits.
pub struct Preview;

impl Preview {
    pub fn create() -> opencv::Result<Self> {
        highgui::named_window(WINDOW_MAIN, highgui::WINDOW_NORMAL)?;
        highgui::named_window(WINDOW_MASK, highgui::WINDOW_NORMAL)?;
        Ok(Self)
    }

    fn show(&self, frame: &RgbImage, mask: Option<&Mask>, s: &TelemetrySnapshot) -> opencv::Result<i32> {
        let mut view = rgb_to_bgr_mat(frame)?;
        annotate(&mut view, s)?;
        highgui::imshow(WINDOW_MAIN, &view)?;
        if let Some(mask) = mask {
            let (w, h) = mask.dimensions();
            let mat = Mat::from_slice_rows_cols(mask.as_raw(), h as usize, w as usize)?;
            highgui::imshow(WINDOW_MASK, &mat)?;
        }
        Ok(highgui::wait_key(1)? & 0xFF)
    }
}

impl TickObserver for Preview {
    fn wants_mask(&self) -> bool {
        true
    }

    fn observe(
        &mut self,
        frame: &RgbImage,
        mask: Option<&Mask>,
        snapshot: &TelemetrySnapshot,
    ) -> Result<LoopControl, ServoError> {
        let key = self
            .show(frame, mask, snapshot)
            .map_err(|e| ServoError::Config(format!("preview failed: {}", e.message)))?;
        Ok(if key == b'q' as i32 || key == KEY_ESC {
            LoopControl::Quit
        } else {
            LoopControl::Continue
        })
    }
}

impl Drop for Preview {
    fn drop(&mut self) {
        if let Err(e) = highgui::destroy_all_windows() {
            warn!("Failed to close preview windows: {}", e);
        }
    }
}

fn rgb_to_bgr_mat(frame: &RgbImage) -> opencv::Result<Mat> {
    let (w, h) = frame.dimensions();
    let pixels: Vec<Vec3b> = frame
        .pixels()
        .map(|p| Vec3b::from([p.0[2], p.0[1], p.0[0]]))
        .collect();
    Mat::from_slice_rows_cols(&pixels, h as usize, w as usize)
}

fn annotate(view: &mut Mat, s: &TelemetrySnapshot) -> opencv::Result<()> {
    let cross = Scalar::new(255.0, 255.0, 255.0, 0.0);
    let target = Scalar::new(0.0, 0.0, 255.0, 0.0);
    let (cx, cy) = (s.center_x, s.center_y);

    imgproc::line(view, Point::new(cx - 40, cy), Point::new(cx + 40, cy), cross, 3, imgproc::LINE_8, 0)?;
    imgproc::line(view, Point::new(cx, cy - 40), Point::new(cx, cy + 40), cross, 3, imgproc::LINE_8, 0)?;

    let text = if s.target_found() {
        imgproc::circle(view, Point::new(s.detection.x, s.detection.y), 8, target, -1, imgproc::LINE_8, 0)?;
        format!(
            "err {:+} px  {:+.2} deg  servo {:.1}",
            s.error_x_px, s.angle_x_deg, s.smoothed_angle
        )
    } else {
        format!("no target  servo {:.1}", s.smoothed_angle)
    };
    imgproc::put_text(
        view,
        &text,
        Point::new(10, 30),
        imgproc::FONT_HERSHEY_SIMPLEX,
        0.8,
        cross,
        2,
        imgproc::LINE_AA,
        false,
    )
}
