//! RGB to HSV conversion on the 8-bit scale used by the thresholds
//!
//! Hue is stored as degrees / 2 (0-179), saturation and value as 0-255.

use image::{ImageBuffer, Rgb, RgbImage};

/// An image whose three channels hold hue, saturation and value.
pub type HsvImage = ImageBuffer<Rgb<u8>, Vec<u8>>;

/// Convert one RGB pixel to (hue, saturation, value).
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let (rf, gf, bf) = (r as f32, g as f32, b as f32);
    let v = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let delta = v - min;

    let s = if v > 0.0 { 255.0 * delta / v } else { 0.0 };

    let mut h = if delta == 0.0 {
        0.0
    } else if v == rf {
        60.0 * (gf - bf) / delta
    } else if v == gf {
        120.0 + 60.0 * (bf - rf) / delta
    } else {
        240.0 + 60.0 * (rf - gf) / delta
    };
    if h < 0.0 {
        h += 360.0;
    }

    // 359 degrees rounds to 180 on the half scale, which wraps to red again.
    let half = (h / 2.0).round();
    let h = if half >= 180.0 { 0 } else { half as u8 };

    (h, s.round() as u8, v as u8)
}

/// Convert a whole frame. Output has the same dimensions as the input.
pub fn to_hsv(frame: &RgbImage) -> HsvImage {
    let (width, height) = frame.dimensions();
    let mut out = HsvImage::new(width, height);
    for (src, dst) in frame.pixels().zip(out.pixels_mut()) {
        let [r, g, b] = src.0;
        let (h, s, v) = rgb_to_hsv(r, g, b);
        *dst = Rgb([h, s, v]);
    }
    out
}
