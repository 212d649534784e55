//! Color segmentation: frame + HSV bounds -> binary foreground mask

use crate::color::rgb_to_hsv;
use image::{GrayImage, Luma, RgbImage};
use imageproc::distance_transform::Norm;
use imageproc::filter::separable_filter_equal;
use imageproc::morphology::{dilate, erode, open};
use pantrack_core::ThresholdConfig;
use tracing::trace;

/// Binary mask: `FOREGROUND` or `BACKGROUND` per pixel, same size as the frame.
pub type Mask = GrayImage;

pub const FOREGROUND: u8 = 255;
pub const BACKGROUND: u8 = 0;

/// Taps in the speckle blur kernel. Must be odd.
pub const BLUR_KERNEL_SIZE: usize = 7;
const BLUR_SIGMA: f32 = 1.4;

/// Chebyshev radius of the 5x5 square structuring element.
const MORPH_RADIUS: u8 = 2;
const CLOSE_PASSES: usize = 2;

/// Mark every pixel whose H, S and V all fall inside the (normalized) bounds.
///
/// This is the raw threshold step, without any noise filtering.
pub fn threshold_hsv(frame: &RgbImage, config: &ThresholdConfig) -> Mask {
    let bounds = config.normalized();
    let (width, height) = frame.dimensions();
    let mut mask = Mask::new(width, height);
    for (src, dst) in frame.pixels().zip(mask.pixels_mut()) {
        let [r, g, b] = src.0;
        let (h, s, v) = rgb_to_hsv(r, g, b);
        *dst = if bounds.contains(h, s, v) {
            Luma([FOREGROUND])
        } else {
            Luma([BACKGROUND])
        };
    }
    mask
}

/// Converts frames into cleaned-up foreground masks.
///
/// Steps, in order: HSV threshold, Gaussian blur with re-binarization,
/// one open pass, then a double close (two dilations, two erosions).
#[derive(Debug, Clone)]
pub struct ColorSegmenter {
    blur_kernel: Vec<f32>,
}

impl Default for ColorSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

impl ColorSegmenter {
    pub fn new() -> Self {
        Self {
            blur_kernel: gaussian_kernel(BLUR_KERNEL_SIZE, BLUR_SIGMA),
        }
    }

    pub fn segment(&self, frame: &RgbImage, config: &ThresholdConfig) -> Mask {
        let raw = threshold_hsv(frame, config);
        let smoothed = self.blur(&raw);
        let opened = open(&smoothed, Norm::LInf, MORPH_RADIUS);
        let closed = close_passes(&opened, CLOSE_PASSES);

        trace!(
            raw = count_foreground(&raw),
            cleaned = count_foreground(&closed),
            "segmented frame"
        );
        closed
    }

    /// Blur the mask and snap it back to binary at half intensity.
    ///
    /// Isolated pixels and one-pixel filaments fall below the cut.
    fn blur(&self, mask: &Mask) -> Mask {
        let mut blurred: GrayImage = separable_filter_equal(mask, &self.blur_kernel);
        for p in blurred.pixels_mut() {
            p.0[0] = if p.0[0] >= 128 { FOREGROUND } else { BACKGROUND };
        }
        blurred
    }
}

fn close_passes(mask: &Mask, passes: usize) -> Mask {
    let mut out = mask.clone();
    for _ in 0..passes {
        out = dilate(&out, Norm::LInf, MORPH_RADIUS);
    }
    for _ in 0..passes {
        out = erode(&out, Norm::LInf, MORPH_RADIUS);
    }
    out
}

fn gaussian_kernel(size: usize, sigma: f32) -> Vec<f32> {
    let half = (size / 2) as f32;
    let weights: Vec<f32> = (0..size)
        .map(|i| {
            let d = i as f32 - half;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f32 = weights.iter().sum();
    weights.into_iter().map(|w| w / sum).collect()
}

pub fn count_foreground(mask: &Mask) -> usize {
    mask.pixels().filter(|p| p.0[0] != BACKGROUND).count()
}
