//! Target location: largest foreground region in a mask and its centroid

use crate::processing::segmentation::{Mask, BACKGROUND, FOREGROUND};
use image::Luma;
use imageproc::region_labelling::{connected_components, Connectivity};
use pantrack_core::config::effective_min_area;
use pantrack_core::DetectionResult;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// An outer foreground region, measured over its filled extent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    /// Row-major position of the region's first pixel
    pub first_pixel: (u32, u32),
    /// Pixel count including enclosed holes (zeroth moment)
    pub area: f64,
    pub m10: f64,
    pub m01: f64,
}

impl Region {
    fn new(x: u32, y: u32) -> Self {
        Self {
            first_pixel: (x, y),
            area: 0.0,
            m10: 0.0,
            m01: 0.0,
        }
    }

    fn add(&mut self, x: u32, y: u32) {
        self.area += 1.0;
        self.m10 += x as f64;
        self.m01 += y as f64;
    }

    /// Centroid from first-order moments, or `None` for an empty region.
    pub fn centroid(&self) -> Option<(i32, i32)> {
        if self.area == 0.0 {
            return None;
        }
        Some(((self.m10 / self.area) as i32, (self.m01 / self.area) as i32))
    }
}

/// Foreground plus every background pixel the image border cannot reach.
///
/// Background is 4-connected, the dual of 8-connected foreground, so each
/// hole is closed off by exactly one outer region.
pub fn fill_enclosed(mask: &Mask) -> Mask {
    let (width, height) = mask.dimensions();
    let inverted = Mask::from_fn(width, height, |x, y| {
        if mask.get_pixel(x, y).0[0] == BACKGROUND {
            Luma([FOREGROUND])
        } else {
            Luma([BACKGROUND])
        }
    });
    let background = connected_components(&inverted, Connectivity::Four, Luma([BACKGROUND]));

    let outside: HashSet<u32> = background
        .enumerate_pixels()
        .filter(|(x, y, _)| *x == 0 || *y == 0 || *x + 1 == width || *y + 1 == height)
        .map(|(_, _, label)| label.0[0])
        .filter(|&label| label != 0)
        .collect();

    Mask::from_fn(width, height, |x, y| {
        if outside.contains(&background.get_pixel(x, y).0[0]) {
            Luma([BACKGROUND])
        } else {
            Luma([FOREGROUND])
        }
    })
}

/// Outer 8-connected foreground regions, ordered by first encounter in a
/// row-major scan.
///
/// Regions nested inside another region's hole are absorbed into it, and
/// each region's area and moments cover everything its outer border encloses.
pub fn regions(mask: &Mask) -> Vec<Region> {
    let filled = fill_enclosed(mask);
    let labels = connected_components(&filled, Connectivity::Eight, Luma([BACKGROUND]));
    let mut index: HashMap<u32, usize> = HashMap::new();
    let mut found: Vec<Region> = Vec::new();

    for (x, y, label) in labels.enumerate_pixels() {
        let label = label.0[0];
        if label == 0 {
            continue;
        }
        let slot = *index.entry(label).or_insert_with(|| {
            found.push(Region::new(x, y));
            found.len() - 1
        });
        found[slot].add(x, y);
    }

    found
}

/// Pick the region with the largest area. Ties go to the first-encountered
/// region.
pub fn largest_region(regions: &[Region]) -> Option<&Region> {
    let mut best: Option<&Region> = None;
    for region in regions {
        match best {
            Some(b) if region.area <= b.area => {}
            _ => best = Some(region),
        }
    }
    best
}

/// Finds the dominant target in a foreground mask.
///
/// Stateless; kept as a type so it can sit next to the other pipeline stages.
#[derive(Debug, Clone, Copy, Default)]
pub struct TargetLocator;

impl TargetLocator {
    pub fn new() -> Self {
        Self
    }

    /// Locate the target in `mask`.
    ///
    /// A rejected candidate still reports its area in the result (with
    /// `found = false`) so telemetry can show how close it came.
    pub fn locate(&self, mask: &Mask, min_area_setting: u32) -> DetectionResult {
        let all = regions(mask);
        let best = match largest_region(&all) {
            Some(region) => *region,
            None => return DetectionResult::not_found(),
        };

        let min_area = effective_min_area(min_area_setting);
        if best.area < min_area {
            debug!(
                area = best.area,
                min_area, "largest region below area threshold"
            );
            return rejected(best.area);
        }

        // Accepted regions are never empty; the None arm only guards the
        // division for hand-built regions.
        match best.centroid() {
            Some((x, y)) => DetectionResult::at(x, y, best.area),
            None => rejected(best.area),
        }
    }
}

fn rejected(area: f64) -> DetectionResult {
    DetectionResult {
        area,
        ..DetectionResult::not_found()
    }
}
