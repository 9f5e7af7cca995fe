//! Channel extraction and 8-bit greyscale conversion.
//!
//! Microscopy stains live in separate channels (DAPI in blue, for
//! example), so the caller picks one channel rather than mixing them
//! into luminance. Everything after this step works on 8-bit
//! greyscale.

use image::{DynamicImage, Luma};

use crate::buffer::PixelBuffer;
use crate::error::DetectionError;
use crate::types::{Gray16Image, GrayImage};

/// Pull one channel out of a decoded image.
///
/// Single-channel images are returned as-is when `channel` is 0.
/// 8-bit colour images yield an 8-bit buffer and 16-bit colour images a
/// 16-bit one.
///
/// # Errors
///
/// Returns [`DetectionError::UnsupportedBuffer`] if the image has no
/// such channel or uses a floating-point layout.
pub fn extract_channel(image: &DynamicImage, channel: u32) -> Result<PixelBuffer, DetectionError> {
    let channels = u32::from(image.color().channel_count());
    if channel >= channels {
        return Err(DetectionError::UnsupportedBuffer(format!(
            "channel {channel} requested from a {channels}-channel image"
        )));
    }
    let c = channel as usize;
    let (w, h) = (image.width(), image.height());
    match image {
        DynamicImage::ImageLuma8(gray) => Ok(PixelBuffer::Gray8(gray.clone())),
        DynamicImage::ImageLuma16(gray) => Ok(PixelBuffer::Gray16(gray.clone())),
        DynamicImage::ImageLumaA8(img) => Ok(PixelBuffer::Gray8(GrayImage::from_fn(w, h, |x, y| {
            Luma([img.get_pixel(x, y).0[c]])
        }))),
        DynamicImage::ImageRgb8(img) => Ok(PixelBuffer::Gray8(GrayImage::from_fn(w, h, |x, y| {
            Luma([img.get_pixel(x, y).0[c]])
        }))),
        DynamicImage::ImageRgba8(img) => Ok(PixelBuffer::Gray8(GrayImage::from_fn(w, h, |x, y| {
            Luma([img.get_pixel(x, y).0[c]])
        }))),
        DynamicImage::ImageLumaA16(img) => Ok(PixelBuffer::Gray16(Gray16Image::from_fn(
            w,
            h,
            |x, y| Luma([img.get_pixel(x, y).0[c]]),
        ))),
        DynamicImage::ImageRgb16(img) => Ok(PixelBuffer::Gray16(Gray16Image::from_fn(
            w,
            h,
            |x, y| Luma([img.get_pixel(x, y).0[c]]),
        ))),
        DynamicImage::ImageRgba16(img) => Ok(PixelBuffer::Gray16(Gray16Image::from_fn(
            w,
            h,
            |x, y| Luma([img.get_pixel(x, y).0[c]]),
        ))),
        other => Err(DetectionError::UnsupportedBuffer(format!(
            "cannot extract a channel from {:?}",
            other.color()
        ))),
    }
}

/// Convert a buffer to 8-bit greyscale.
///
/// 8-bit buffers are copied unchanged. 16-bit buffers are stretched
/// linearly so their darkest pixel maps to 0 and their brightest to
/// 255; a flat 16-bit image maps to all zeros.
#[must_use = "returns the 8-bit image"]
pub fn to_gray8(buffer: &PixelBuffer) -> GrayImage {
    match buffer {
        PixelBuffer::Gray8(img) => img.clone(),
        PixelBuffer::Gray16(img) => stretch_16(img),
    }
}

fn stretch_16(img: &Gray16Image) -> GrayImage {
    let (min, max) = img
        .pixels()
        .fold((u16::MAX, u16::MIN), |(lo, hi), p| (lo.min(p.0[0]), hi.max(p.0[0])));
    if max <= min {
        return GrayImage::new(img.width(), img.height());
    }
    let range = u32::from(max - min);
    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        let v = u32::from(img.get_pixel(x, y).0[0] - min);
        #[allow(clippy::cast_possible_truncation)]
        let scaled = ((v * 255 + range / 2) / range) as u8;
        Luma([scaled])
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn gray8_passes_through() {
        let img = GrayImage::from_fn(3, 3, |x, _| Luma([u8::try_from(x * 50).unwrap()]));
        let out = to_gray8(&PixelBuffer::Gray8(img.clone()));
        assert_eq!(out, img);
    }

    #[test]
    fn gray16_is_stretched_to_full_range() {
        let img = Gray16Image::from_fn(3, 1, |x, _| Luma([1000 + u16::try_from(x).unwrap() * 500]));
        let out = to_gray8(&PixelBuffer::Gray16(img));
        assert_eq!(out.get_pixel(0, 0).0[0], 0);
        assert_eq!(out.get_pixel(1, 0).0[0], 128);
        assert_eq!(out.get_pixel(2, 0).0[0], 255);
    }

    #[test]
    fn flat_gray16_maps_to_zero() {
        let img = Gray16Image::from_fn(4, 4, |_, _| Luma([777]));
        let out = to_gray8(&PixelBuffer::Gray16(img));
        assert!(out.pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn extract_blue_channel_from_rgb() {
        let img = DynamicImage::ImageRgb8(image::RgbImage::from_fn(2, 2, |_, _| {
            image::Rgb([10, 20, 30])
        }));
        let buffer = extract_channel(&img, 2).unwrap();
        let gray = to_gray8(&buffer);
        assert!(gray.pixels().all(|p| p.0[0] == 30));
    }

    #[test]
    fn extract_from_rgb16_keeps_depth() {
        let img = DynamicImage::ImageRgb16(image::ImageBuffer::from_fn(2, 2, |_, _| {
            image::Rgb([1u16, 2, 3])
        }));
        let buffer = extract_channel(&img, 1).unwrap();
        assert_eq!(buffer.bit_depth(), 16);
    }

    #[test]
    fn missing_channel_is_rejected() {
        let img = DynamicImage::ImageLuma8(GrayImage::new(2, 2));
        let result = extract_channel(&img, 1);
        assert!(
            matches!(result, Err(DetectionError::UnsupportedBuffer(_))),
            "expected UnsupportedBuffer, got {result:?}"
        );
    }
}
