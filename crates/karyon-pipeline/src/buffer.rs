//! Single-channel pixel buffers accepted by the detector.

use image::DynamicImage;

use crate::error::DetectionError;
use crate::types::{Dimensions, Gray16Image, GrayImage};

/// Read-only access to a single-channel image of any supported depth.
///
/// The detector reads pixels only through this trait so it can scan
/// 8- and 16-bit images with the same code.
pub trait PixelAccess {
    /// Image dimensions.
    fn dimensions(&self) -> Dimensions;

    /// Value of pixel `(x, y)`. Callers stay inside [`dimensions`](Self::dimensions).
    fn value(&self, x: u32, y: u32) -> u32;

    /// Largest representable pixel value.
    fn max_value(&self) -> u32;
}

impl PixelAccess for GrayImage {
    fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.width(),
            height: self.height(),
        }
    }

    fn value(&self, x: u32, y: u32) -> u32 {
        u32::from(self.get_pixel(x, y).0[0])
    }

    fn max_value(&self) -> u32 {
        u32::from(u8::MAX)
    }
}

impl PixelAccess for Gray16Image {
    fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.width(),
            height: self.height(),
        }
    }

    fn value(&self, x: u32, y: u32) -> u32 {
        u32::from(self.get_pixel(x, y).0[0])
    }

    fn max_value(&self) -> u32 {
        u32::from(u16::MAX)
    }
}

/// A single-channel 8- or 16-bit image.
///
/// Colour, alpha, and floating-point layouts are rejected when
/// converting from [`DynamicImage`]; channel selection is the caller's
/// job.
#[derive(Debug, Clone)]
pub enum PixelBuffer {
    /// 8-bit greyscale.
    Gray8(GrayImage),
    /// 16-bit greyscale.
    Gray16(Gray16Image),
}

impl PixelBuffer {
    /// Image dimensions.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        match self {
            Self::Gray8(img) => PixelAccess::dimensions(img),
            Self::Gray16(img) => PixelAccess::dimensions(img),
        }
    }

    /// Bits per pixel.
    #[must_use]
    pub const fn bit_depth(&self) -> u8 {
        match self {
            Self::Gray8(_) => 8,
            Self::Gray16(_) => 16,
        }
    }

    /// The buffer as a trait object for depth-independent reads.
    #[must_use]
    pub fn as_access(&self) -> &dyn PixelAccess {
        match self {
            Self::Gray8(img) => img,
            Self::Gray16(img) => img,
        }
    }
}

impl From<GrayImage> for PixelBuffer {
    fn from(img: GrayImage) -> Self {
        Self::Gray8(img)
    }
}

impl From<Gray16Image> for PixelBuffer {
    fn from(img: Gray16Image) -> Self {
        Self::Gray16(img)
    }
}

impl TryFrom<DynamicImage> for PixelBuffer {
    type Error = DetectionError;

    fn try_from(img: DynamicImage) -> Result<Self, Self::Error> {
        match img {
            DynamicImage::ImageLuma8(gray) => Ok(Self::Gray8(gray)),
            DynamicImage::ImageLuma16(gray) => Ok(Self::Gray16(gray)),
            other => Err(DetectionError::UnsupportedBuffer(format!(
                "expected an 8- or 16-bit single-channel image, got {:?}",
                other.color()
            ))),
        }
    }
}
