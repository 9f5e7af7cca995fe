//! The preprocessing filter chain.
//!
//! A [`FilterChain`] owns the working image and tracks its polarity.
//! Each step consumes the chain and returns it with the image replaced,
//! in the fixed order greyscale, border, smoothing, flattening, edge
//! detection, gap closing. Adding a border inverts the image; edge
//! detection and gap closing produce foreground-bright maps and clear
//! the flag. [`FilterChain::into_detection_image`] undoes any remaining
//! inversion so the detector always sees bright objects.

use serde::{Deserialize, Serialize};

use crate::border;
use crate::buffer::PixelBuffer;
use crate::edge;
use crate::error::DetectionError;
use crate::flatten;
use crate::grayscale;
use crate::morphology;
use crate::options::FilterOptions;
use crate::smooth;
use crate::types::{Dimensions, GrayImage};

/// An optional preprocessing step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterStep {
    /// Background padding followed by inversion.
    Border,
    /// Kuwahara smoothing.
    Smoothing,
    /// Bright-region clamping.
    Flattening,
    /// Gaussian blur plus Canny.
    EdgeDetection,
    /// Dilate, fill holes, erode.
    GapClosing,
}

impl FilterStep {
    /// Steps in the order the chain applies them.
    pub const ORDER: [Self; 5] = [
        Self::Border,
        Self::Smoothing,
        Self::Flattening,
        Self::EdgeDetection,
        Self::GapClosing,
    ];

    /// Human-readable step name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Border => "Border",
            Self::Smoothing => "Smoothing",
            Self::Flattening => "Flattening",
            Self::EdgeDetection => "Edge Detection",
            Self::GapClosing => "Gap Closing",
        }
    }
}

/// The working image plus the bookkeeping later steps depend on.
#[derive(Debug, Clone)]
#[must_use = "filter chains are consumed by each step; keep the returned chain"]
pub struct FilterChain {
    image: GrayImage,
    inverted: bool,
    border: u32,
}

impl FilterChain {
    /// Start a chain from a raw buffer by converting it to 8-bit greyscale.
    pub fn from_buffer(buffer: &PixelBuffer) -> Self {
        Self::from_gray(grayscale::to_gray8(buffer))
    }

    /// Start a chain from an 8-bit image.
    pub const fn from_gray(image: GrayImage) -> Self {
        Self {
            image,
            inverted: false,
            border: 0,
        }
    }

    /// The current working image.
    #[must_use]
    pub const fn image(&self) -> &GrayImage {
        &self.image
    }

    /// Current image dimensions.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.image.width(),
            height: self.image.height(),
        }
    }

    /// Whether the working image is currently inverted.
    #[must_use]
    pub const fn is_inverted(&self) -> bool {
        self.inverted
    }

    /// Total padding added on each side so far.
    #[must_use]
    pub const fn border_width(&self) -> u32 {
        self.border
    }

    /// Pad with `width` background pixels per side, then invert.
    ///
    /// # Errors
    ///
    /// Returns [`DetectionError::InvalidConfig`] when the padded image
    /// would be too large to address.
    pub fn add_border(self, width: u32) -> Result<Self, DetectionError> {
        let total = self.border.checked_add(width).ok_or_else(|| {
            DetectionError::InvalidConfig(format!("total border exceeds {} pixels", u32::MAX))
        })?;
        Ok(Self {
            image: border::add_border(&self.image, width)?,
            inverted: !self.inverted,
            border: total,
        })
    }

    /// Kuwahara smoothing with window `kernel`.
    pub fn smooth(self, kernel: u32) -> Self {
        Self {
            image: smooth::kuwahara(&self.image, kernel),
            ..self
        }
    }

    /// Clamp structures brighter than `ceiling` in the original polarity.
    pub fn flatten(self, ceiling: u8) -> Self {
        Self {
            image: flatten::flatten(&self.image, ceiling, self.inverted),
            ..self
        }
    }

    /// Replace the image with its Canny edge map.
    ///
    /// Gradient magnitude ignores polarity, and the map is
    /// foreground-bright, so the inversion flag is cleared.
    pub fn detect_edges(self, sigma: f32, low: f32, high: f32) -> Self {
        Self {
            image: edge::detect_edges(&self.image, sigma, low, high),
            inverted: false,
            ..self
        }
    }

    /// Close gaps in the bright foreground with a disk of `radius`.
    ///
    /// An inverted image is flipped back first so the closing acts on
    /// the objects rather than the background.
    pub fn close_gaps(self, radius: u8) -> Self {
        let upright = if self.inverted {
            border::invert(&self.image)
        } else {
            self.image
        };
        Self {
            image: morphology::close_gaps(&upright, radius),
            inverted: false,
            border: self.border,
        }
    }

    /// Run `step` with its settings from `options`, or return the chain
    /// unchanged when the step is disabled.
    ///
    /// # Errors
    ///
    /// Fails only for a border that cannot be added; see
    /// [`FilterChain::add_border`].
    pub fn apply(self, step: FilterStep, options: &FilterOptions) -> Result<Self, DetectionError> {
        if !options.is_enabled(step) {
            return Ok(self);
        }
        Ok(match step {
            FilterStep::Border => self.add_border(options.border_width)?,
            FilterStep::Smoothing => self.smooth(options.smoothing_kernel),
            FilterStep::Flattening => self.flatten(options.flatten_threshold),
            FilterStep::EdgeDetection => self.detect_edges(
                options.canny_kernel_radius,
                options.canny_low,
                options.canny_high,
            ),
            FilterStep::GapClosing => self.close_gaps(options.closing_radius),
        })
    }

    /// Run every enabled step in [`FilterStep::ORDER`].
    ///
    /// # Errors
    ///
    /// See [`FilterChain::apply`].
    pub fn apply_all(self, options: &FilterOptions) -> Result<Self, DetectionError> {
        FilterStep::ORDER
            .into_iter()
            .try_fold(self, |chain, step| chain.apply(step, options))
    }

    /// Finish the chain: undo any outstanding inversion and return the
    /// foreground-bright image with the border width to subtract from
    /// detected coordinates.
    #[must_use]
    pub fn into_detection_image(self) -> (GrayImage, u32) {
        let image = if self.inverted {
            border::invert(&self.image)
        } else {
            self.image
        };
        (image, self.border)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use image::Luma;

    fn spot() -> GrayImage {
        GrayImage::from_fn(20, 20, |x, y| {
            let (dx, dy) = (i64::from(x) - 10, i64::from(y) - 10);
            Luma([if dx * dx + dy * dy <= 16 { 200 } else { 20 }])
        })
    }

    #[test]
    fn disabled_options_leave_image_alone() {
        let chain = FilterChain::from_gray(spot())
            .apply_all(&FilterOptions::disabled())
            .unwrap();
        assert!(!chain.is_inverted());
        let (image, border) = chain.into_detection_image();
        assert_eq!(image, spot());
        assert_eq!(border, 0);
    }

    #[test]
    fn border_inverts_and_detection_image_restores() {
        let chain = FilterChain::from_gray(spot()).add_border(3).unwrap();
        assert!(chain.is_inverted());
        assert_eq!(chain.dimensions(), Dimensions { width: 26, height: 26 });
        assert_eq!(chain.image().get_pixel(13, 13).0[0], 55);

        let (image, border) = chain.into_detection_image();
        assert_eq!(border, 3);
        assert_eq!(image.get_pixel(13, 13).0[0], 200);
        assert_eq!(image.get_pixel(0, 0).0[0], 0);
    }

    #[test]
    fn flatten_respects_inversion() {
        let upright = FilterChain::from_gray(spot()).flatten(100);
        let (a, _) = upright.into_detection_image();
        let inverted = FilterChain::from_gray(spot()).add_border(0).unwrap().flatten(100);
        let (b, _) = inverted.into_detection_image();
        assert_eq!(a, b);
        assert_eq!(a.get_pixel(10, 10).0[0], 100);
    }

    #[test]
    fn edge_detection_clears_inversion() {
        let chain = FilterChain::from_gray(spot())
            .add_border(2)
            .unwrap()
            .detect_edges(1.0, 50.0, 150.0);
        assert!(!chain.is_inverted());
        assert_eq!(chain.border_width(), 2);
    }

    #[test]
    fn edges_then_closing_yield_solid_object() {
        let options = FilterOptions {
            use_smoothing: false,
            use_flattening: false,
            canny_kernel_radius: 1.0,
            closing_radius: 2,
            ..FilterOptions::default()
        };
        let (image, _) = FilterChain::from_gray(spot())
            .apply_all(&options)
            .unwrap()
            .into_detection_image();
        assert_eq!(image.get_pixel(10, 10).0[0], 255, "centre should be filled");
        assert_eq!(image.get_pixel(0, 0).0[0], 0, "corner should be background");
    }

    #[test]
    fn step_order_and_names() {
        assert_eq!(FilterStep::ORDER[0], FilterStep::Border);
        assert_eq!(FilterStep::ORDER[4], FilterStep::GapClosing);
        assert_eq!(FilterStep::EdgeDetection.name(), "Edge Detection");
    }
}
