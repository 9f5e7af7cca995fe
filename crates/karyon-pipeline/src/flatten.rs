//! Bright-region flattening.
//!
//! Chromocentres and other bright inclusions produce strong internal
//! edges. Clamping everything above a ceiling leaves the nuclear
//! outline as the dominant edge.

use image::{GrayImage, Luma};

/// Clamp pixels brighter than `ceiling` down to `ceiling`.
///
/// When `inverted` is set the image has had its polarity flipped, so the
/// bright structures of the original are now dark: pixels darker than
/// `255 - ceiling` are raised to it instead.
#[must_use = "returns the flattened image"]
pub fn flatten(image: &GrayImage, ceiling: u8, inverted: bool) -> GrayImage {
    let floor = u8::MAX - ceiling;
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let v = image.get_pixel(x, y).0[0];
        Luma([if inverted { v.max(floor) } else { v.min(ceiling) }])
    })
}

/// Number of pixels [`flatten`] would change.
#[must_use]
pub fn count_clamped(image: &GrayImage, ceiling: u8, inverted: bool) -> u64 {
    let floor = u8::MAX - ceiling;
    image
        .pixels()
        .map(|p| u64::from(if inverted { p.0[0] < floor } else { p.0[0] > ceiling }))
        .sum()
}
