use image::{Luma, Rgb, RgbImage};
use pantrack_core::{effective_min_area, ThresholdConfig};
use pantrack_eye::color::rgb_to_hsv;
use pantrack_eye::processing::{
    fill_enclosed, regions, threshold_hsv, Mask, TargetLocator, FOREGROUND,
};
use proptest::prelude::*;

fn arb_threshold() -> impl Strategy<Value = ThresholdConfig> {
    (
        0u8..=179,
        0u8..=179,
        any::<u8>(),
        any::<u8>(),
        any::<u8>(),
        any::<u8>(),
        0u32..400,
    )
        .prop_map(|(h_min, h_max, s_min, s_max, v_min, v_max, min_area)| ThresholdConfig {
            h_min,
            h_max,
            s_min,
            s_max,
            v_min,
            v_max,
            min_area,
        })
}

fn arb_rects() -> impl Strategy<Value = Vec<(u32, u32, u32, u32)>> {
    prop::collection::vec((0u32..48, 0u32..48, 1u32..16, 1u32..16), 0..6)
}

fn mask_from_rects(rects: &[(u32, u32, u32, u32)]) -> Mask {
    let mut mask = Mask::new(64, 64);
    for &(x0, y0, w, h) in rects {
        for y in y0..(y0 + h).min(64) {
            for x in x0..(x0 + w).min(64) {
                mask.put_pixel(x, y, Luma([FOREGROUND]));
            }
        }
    }
    mask
}

proptest! {
    #[test]
    fn test_threshold_marks_pixel_iff_in_range(
        pixels in prop::collection::vec(any::<[u8; 3]>(), 64),
        config in arb_threshold(),
    ) {
        let frame = RgbImage::from_fn(8, 8, |x, y| Rgb(pixels[(y * 8 + x) as usize]));
        let mask = threshold_hsv(&frame, &config);
        let bounds = config.normalized();

        for (x, y, p) in frame.enumerate_pixels() {
            let (h, s, v) = rgb_to_hsv(p.0[0], p.0[1], p.0[2]);
            let marked = mask.get_pixel(x, y).0[0] == FOREGROUND;
            prop_assert_eq!(marked, bounds.contains(h, s, v));
        }
    }

    #[test]
    fn test_locate_never_accepts_small_regions(rects in arb_rects(), min_area in 0u32..300) {
        let mask = mask_from_rects(&rects);
        let result = TargetLocator::new().locate(&mask, min_area);
        if result.found {
            prop_assert!(result.area >= effective_min_area(min_area));
        }
    }

    #[test]
    fn test_located_region_is_largest(rects in arb_rects()) {
        let mask = mask_from_rects(&rects);
        let result = TargetLocator::new().locate(&mask, 0);
        let largest = regions(&mask).iter().map(|r| r.area).fold(0.0, f64::max);

        prop_assert_eq!(result.area, largest);
        if result.found {
            prop_assert!((0..64).contains(&result.x));
            prop_assert!((0..64).contains(&result.y));
        }
    }

    #[test]
    fn test_region_areas_cover_filled_mask(rects in arb_rects()) {
        let mask = mask_from_rects(&rects);
        let total: f64 = regions(&mask).iter().map(|r| r.area).sum();
        let foreground = mask.pixels().filter(|p| p.0[0] == FOREGROUND).count();
        let filled = fill_enclosed(&mask).pixels().filter(|p| p.0[0] == FOREGROUND).count();
        prop_assert!(filled >= foreground);
        prop_assert_eq!(total, filled as f64);
    }
}
