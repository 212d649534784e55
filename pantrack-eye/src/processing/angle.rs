//! Pixel error to angular error, linear pinhole approximation

/// Frame center in pixels, integer division of each dimension.
pub fn frame_center(width: u32, height: u32) -> (i32, i32) {
    ((width / 2) as i32, (height / 2) as i32)
}

/// Signed horizontal pixel error of the target relative to the center.
#[inline]
pub fn pixel_error(target_x: i32, frame_center_x: i32) -> i32 {
    target_x - frame_center_x
}

/// Convert a horizontal target position to an angular error in degrees.
///
/// `(target_x - center_x) / frame_width * fov_degrees`. No distortion
/// correction. Returns 0 for a zero-width frame.
pub fn to_angle(target_x: i32, frame_center_x: i32, frame_width: u32, fov_degrees: f64) -> f64 {
    if frame_width == 0 {
        return 0.0;
    }
    let error = pixel_error(target_x, frame_center_x) as f64;
    (error / frame_width as f64) * fov_degrees
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario_right_of_center() {
        let (cx, _) = frame_center(1280, 720);
        assert_eq!(cx, 640);
        assert_eq!(pixel_error(700, cx), 60);
        assert_eq!(to_angle(700, cx, 1280, 60.0), 2.8125);
    }

    #[test]
    fn test_left_of_center_is_negative() {
        assert_eq!(to_angle(580, 640, 1280, 60.0), -2.8125);
    }

    #[test]
    fn test_centered_is_zero() {
        assert_eq!(to_angle(640, 640, 1280, 60.0), 0.0);
    }

    #[test]
    fn test_edges_span_half_fov() {
        assert_eq!(to_angle(0, 640, 1280, 60.0), -30.0);
        assert_eq!(to_angle(1280, 640, 1280, 60.0), 30.0);
    }

    #[test]
    fn test_odd_width_center_truncates() {
        assert_eq!(frame_center(641, 481), (320, 240));
    }

    #[test]
    fn test_zero_width() {
        assert_eq!(to_angle(10, 0, 0, 60.0), 0.0);
    }
}
