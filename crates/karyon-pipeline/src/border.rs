//! Border padding and polarity inversion.
//!
//! Padding gives objects that touch the image edge a background margin
//! so their outlines close inside the image. The padded image is then
//! inverted, which flips polarity for every later step until the chain
//! restores it.

use image::GrayImage;

use crate::error::DetectionError;

/// Pad `image` with `width` background (0) pixels on each side, then
/// invert it.
///
/// The result is `2 * width` pixels wider and taller than the input.
/// Source pixel `(x, y)` lands at `(x + width, y + width)`.
///
/// # Errors
///
/// Returns [`DetectionError::InvalidConfig`] when the padded size does
/// not fit in `u32`.
pub fn add_border(image: &GrayImage, width: u32) -> Result<GrayImage, DetectionError> {
    let padded = |side: u32| {
        width
            .checked_mul(2)
            .and_then(|pad| side.checked_add(pad))
            .ok_or_else(|| {
                DetectionError::InvalidConfig(format!(
                    "border of {width} pixels overflows a {}x{} image",
                    image.width(),
                    image.height()
                ))
            })
    };
    let mut canvas = GrayImage::new(padded(image.width())?, padded(image.height())?);
    image::imageops::replace(&mut canvas, image, i64::from(width), i64::from(width));
    Ok(invert(&canvas))
}

/// Invert every pixel (`255 - v`).
#[must_use = "returns the inverted image"]
pub fn invert(image: &GrayImage) -> GrayImage {
    let mut out = image.clone();
    image::imageops::invert(&mut out);
    out
}
