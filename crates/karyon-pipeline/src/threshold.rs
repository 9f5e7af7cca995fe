//! Binarization at a fixed threshold.

use image::{GrayImage, Luma};

/// Map pixels brighter than `threshold` to 255 and the rest to 0.
#[must_use = "returns the binary image"]
pub fn binarize(image: &GrayImage, threshold: u8) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        Luma([if image.get_pixel(x, y).0[0] > threshold { u8::MAX } else { 0 }])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_is_exclusive() {
        let img = GrayImage::from_fn(3, 1, |x, _| Luma([[127, 128, 129][x as usize]]));
        let out = binarize(&img, 128);
        let values: Vec<u8> = out.pixels().map(|p| p.0[0]).collect();
        assert_eq!(values, vec![0, 0, 255]);
    }

    #[test]
    fn max_threshold_clears_everything() {
        let img = GrayImage::from_fn(4, 4, |_, _| Luma([255]));
        assert!(binarize(&img, 255).pixels().all(|p| p.0[0] == 0));
    }
}
