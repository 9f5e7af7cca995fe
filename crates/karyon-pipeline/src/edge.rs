//! Gaussian-smoothed Canny edge detection.
//!
//! Blurs with [`imageproc::filter::gaussian_blur_f32`], then runs
//! [`imageproc::edges::canny`]. The output is a binary map: 255 on
//! edges, 0 elsewhere.

use image::GrayImage;

/// Minimum allowed Canny threshold.
///
/// A low threshold of zero marks every pixel with any gradient as a
/// candidate edge, so noise inside the nucleus floods the map.
pub const MIN_THRESHOLD: f32 = 1.0;
const _: () = assert!(MIN_THRESHOLD > 0.0);

/// Canny thresholds after clamping: both at least [`MIN_THRESHOLD`],
/// low no higher than high.
#[must_use]
pub fn clamp_thresholds(low: f32, high: f32) -> (f32, f32) {
    let high = high.max(MIN_THRESHOLD);
    let low = low.max(MIN_THRESHOLD).min(high);
    (low, high)
}

/// Gaussian blur. Non-positive `sigma` returns the image unchanged,
/// since `imageproc` panics on `sigma <= 0.0`.
#[must_use = "returns the blurred image"]
pub fn gaussian_blur(image: &GrayImage, sigma: f32) -> GrayImage {
    if sigma <= 0.0 || !sigma.is_finite() {
        return image.clone();
    }
    imageproc::filter::gaussian_blur_f32(image, sigma)
}

/// Blur with `sigma`, then detect edges with hysteresis thresholds
/// `low` and `high` (clamped by [`clamp_thresholds`]).
#[must_use = "returns the binary edge map"]
pub fn detect_edges(image: &GrayImage, sigma: f32, low: f32, high: f32) -> GrayImage {
    let (low, high) = clamp_thresholds(low, high);
    let blurred = gaussian_blur(image, sigma);
    imageproc::edges::canny(&blurred, low, high)
}

/// Count pixels at full intensity (255).
#[must_use]
pub fn count_foreground(image: &GrayImage) -> u64 {
    image
        .pixels()
        .map(|p| u64::from(u8::from(p.0[0] == u8::MAX)))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 20x20 image with a bright square in the middle.
    fn square_image() -> GrayImage {
        GrayImage::from_fn(20, 20, |x, y| {
            if (6..14).contains(&x) && (6..14).contains(&y) {
                image::Luma([220])
            } else {
                image::Luma([10])
            }
        })
    }

    #[test]
    fn blank_image_produces_no_edges() {
        let img = GrayImage::from_fn(20, 20, |_, _| image::Luma([128]));
        let edges = detect_edges(&img, 1.0, 50.0, 150.0);
        assert_eq!(count_foreground(&edges), 0, "expected no edges in uniform image");
    }

    #[test]
    fn square_outline_is_detected() {
        let edges = detect_edges(&square_image(), 1.0, 50.0, 150.0);
        assert!(
            count_foreground(&edges) > 0,
            "expected edges around the square, found none"
        );
        // Deep background stays clear.
        assert_eq!(edges.get_pixel(1, 1).0[0], 0);
    }

    #[test]
    fn non_positive_sigma_skips_blur() {
        let img = square_image();
        assert_eq!(gaussian_blur(&img, 0.0), img);
        assert_eq!(gaussian_blur(&img, -2.0), img);
    }

    #[test]
    fn zero_low_threshold_is_clamped_to_min() {
        assert_eq!(clamp_thresholds(0.0, 150.0), (MIN_THRESHOLD, 150.0));
        let img = square_image();
        assert_eq!(
            detect_edges(&img, 1.0, 0.0, 150.0),
            detect_edges(&img, 1.0, MIN_THRESHOLD, 150.0)
        );
    }

    #[test]
    fn low_above_high_is_clamped() {
        assert_eq!(clamp_thresholds(200.0, 100.0), (100.0, 100.0));
    }

    #[test]
    fn output_dimensions_match_input() {
        let img = GrayImage::new(17, 31);
        let edges = detect_edges(&img, 1.5, 50.0, 150.0);
        assert_eq!((edges.width(), edges.height()), (17, 31));
    }
}
