//! Detection and preprocessing options.
//!
//! Both structs deserialize with `#[serde(default)]`, so a JSON config
//! only needs the fields it changes.

use serde::{Deserialize, Serialize};

use crate::error::DetectionError;
use crate::filter::FilterStep;
use crate::trace::Connectivity;
use crate::types::Dimensions;

/// Default binarization threshold for nuclear stains.
pub const DEFAULT_THRESHOLD: u8 = 36;
/// Default minimum object size in pixels.
pub const DEFAULT_MIN_SIZE: u64 = 2000;
/// Default maximum object size in pixels.
pub const DEFAULT_MAX_SIZE: u64 = 10_000;
/// Default minimum circularity.
pub const DEFAULT_MIN_CIRCULARITY: f64 = 0.2;
/// Default maximum circularity.
pub const DEFAULT_MAX_CIRCULARITY: f64 = 0.8;
/// Minimum object size used by the relaxed second pass.
pub const RELAXED_MIN_SIZE: u64 = 50;

/// Default Kuwahara kernel size.
pub const DEFAULT_SMOOTHING_KERNEL: u32 = 3;
/// Default brightness ceiling for flattening.
pub const DEFAULT_FLATTEN_THRESHOLD: u8 = 100;
/// Default Canny low threshold (gradient magnitude).
pub const DEFAULT_CANNY_LOW: f32 = 50.0;
/// Default Canny high threshold (gradient magnitude).
pub const DEFAULT_CANNY_HIGH: f32 = 150.0;
/// Default Gaussian sigma applied before Canny.
pub const DEFAULT_CANNY_KERNEL_RADIUS: f32 = 3.0;
/// Default closing disk radius.
pub const DEFAULT_CLOSING_RADIUS: u8 = 5;
/// Default padding added by the border step.
pub const DEFAULT_BORDER_WIDTH: u32 = 2;
/// Widest accepted border padding.
pub const MAX_BORDER_WIDTH: u32 = 4096;

/// Per-step preprocessing settings.
///
/// Each optional step has its own enable flag and is a no-op when the
/// flag is off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterOptions {
    /// Pad the image and invert it before the remaining steps.
    pub add_border: bool,
    /// Padding in pixels on each side when `add_border` is set.
    pub border_width: u32,

    /// Apply the edge-preserving Kuwahara filter.
    pub use_smoothing: bool,
    /// Kuwahara kernel size (odd; even values are rounded up).
    pub smoothing_kernel: u32,

    /// Clamp bright structures (e.g. chromocentres) to a ceiling.
    pub use_flattening: bool,
    /// Brightness ceiling for flattening.
    pub flatten_threshold: u8,

    /// Replace the image with its Canny edge map.
    pub use_edge_detection: bool,
    /// Canny low threshold. Clamped to at least [`edge::MIN_THRESHOLD`](crate::edge::MIN_THRESHOLD).
    pub canny_low: f32,
    /// Canny high threshold. Clamped to at least `canny_low`.
    pub canny_high: f32,
    /// Sigma of the Gaussian blur run before Canny.
    pub canny_kernel_radius: f32,

    /// Close gaps in the foreground: dilate, fill holes, erode.
    pub use_gap_closing: bool,
    /// Disk radius for closing.
    pub closing_radius: u8,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            add_border: false,
            border_width: DEFAULT_BORDER_WIDTH,
            use_smoothing: true,
            smoothing_kernel: DEFAULT_SMOOTHING_KERNEL,
            use_flattening: true,
            flatten_threshold: DEFAULT_FLATTEN_THRESHOLD,
            use_edge_detection: true,
            canny_low: DEFAULT_CANNY_LOW,
            canny_high: DEFAULT_CANNY_HIGH,
            canny_kernel_radius: DEFAULT_CANNY_KERNEL_RADIUS,
            use_gap_closing: true,
            closing_radius: DEFAULT_CLOSING_RADIUS,
        }
    }
}

impl FilterOptions {
    /// Options with every step disabled.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            add_border: false,
            use_smoothing: false,
            use_flattening: false,
            use_edge_detection: false,
            use_gap_closing: false,
            ..Self::default()
        }
    }

    /// Whether `step` will run.
    #[must_use]
    pub const fn is_enabled(&self, step: FilterStep) -> bool {
        match step {
            FilterStep::Border => self.add_border,
            FilterStep::Smoothing => self.use_smoothing,
            FilterStep::Flattening => self.use_flattening,
            FilterStep::EdgeDetection => self.use_edge_detection,
            FilterStep::GapClosing => self.use_gap_closing,
        }
    }

    /// Turn `step` on or off.
    pub const fn set_enabled(&mut self, step: FilterStep, enabled: bool) {
        match step {
            FilterStep::Border => self.add_border = enabled,
            FilterStep::Smoothing => self.use_smoothing = enabled,
            FilterStep::Flattening => self.use_flattening = enabled,
            FilterStep::EdgeDetection => self.use_edge_detection = enabled,
            FilterStep::GapClosing => self.use_gap_closing = enabled,
        }
    }

    fn validate(&self) -> Result<(), DetectionError> {
        if self.add_border && self.border_width == 0 {
            return Err(invalid("border_width must be positive when add_border is set"));
        }
        if self.add_border && self.border_width > MAX_BORDER_WIDTH {
            return Err(invalid(format!(
                "border_width must be at most {MAX_BORDER_WIDTH}, got {}",
                self.border_width
            )));
        }
        if self.use_smoothing && self.smoothing_kernel == 0 {
            return Err(invalid("smoothing_kernel must be positive"));
        }
        if self.use_edge_detection {
            for (name, value) in [
                ("canny_low", self.canny_low),
                ("canny_high", self.canny_high),
                ("canny_kernel_radius", self.canny_kernel_radius),
            ] {
                if !value.is_finite() {
                    return Err(invalid(format!("{name} must be finite, got {value}")));
                }
            }
        }
        Ok(())
    }
}

/// Everything the detector and pipeline need to find objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionOptions {
    /// Binarization threshold: pixels brighter than this are foreground.
    pub threshold: u8,
    /// Smallest accepted object, in pixels (inclusive).
    pub min_size: u64,
    /// Largest accepted object, in pixels (inclusive). `None` means the
    /// area of the image being searched.
    pub max_size: Option<u64>,
    /// Lowest accepted circularity (inclusive).
    pub min_circularity: f64,
    /// Highest accepted circularity (inclusive).
    pub max_circularity: f64,
    /// Image channel the caller loads.
    pub channel: u32,
    /// Count enclosed holes as part of an object's area.
    pub include_holes: bool,
    /// Reject objects whose bounding box touches the image edge.
    pub exclude_edges: bool,
    /// Pixel connectivity for tracing and filling.
    pub connectivity: Connectivity,
    /// Pixels per micron, for calibrated measurements.
    pub scale: f64,
    /// Preprocessing settings.
    pub filter: FilterOptions,
}

impl Default for DetectionOptions {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            min_size: DEFAULT_MIN_SIZE,
            max_size: Some(DEFAULT_MAX_SIZE),
            min_circularity: DEFAULT_MIN_CIRCULARITY,
            max_circularity: DEFAULT_MAX_CIRCULARITY,
            channel: 2,
            include_holes: true,
            exclude_edges: true,
            connectivity: Connectivity::default(),
            scale: 1.0,
            filter: FilterOptions::default(),
        }
    }
}

impl DetectionOptions {
    /// Check every invariant, failing on the first violation.
    ///
    /// # Errors
    ///
    /// Returns [`DetectionError::InvalidConfig`] when a circularity
    /// bound is non-finite or outside `[0, 1]`, when `min_circularity`
    /// is not below `max_circularity`, when `min_size` is not below an
    /// explicit `max_size`, when `scale` is not positive, or when a
    /// filter setting is unusable.
    pub fn validate(&self) -> Result<(), DetectionError> {
        for (name, value) in [
            ("min_circularity", self.min_circularity),
            ("max_circularity", self.max_circularity),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(invalid(format!("{name} must be within [0, 1], got {value}")));
            }
        }
        if self.min_circularity >= self.max_circularity {
            return Err(invalid(format!(
                "min_circularity {} must be below max_circularity {}",
                self.min_circularity, self.max_circularity
            )));
        }
        if let Some(max) = self.max_size {
            if self.min_size >= max {
                return Err(invalid(format!(
                    "min_size {} must be below max_size {max}",
                    self.min_size
                )));
            }
        }
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(invalid(format!("scale must be positive, got {}", self.scale)));
        }
        self.filter.validate()
    }

    /// The maximum size that applies to an image of `dimensions`.
    #[must_use]
    pub fn max_size_for(&self, dimensions: Dimensions) -> u64 {
        self.max_size.unwrap_or_else(|| dimensions.pixel_count())
    }

    /// A permissive copy for a second pass after a strict pass finds
    /// nothing: minimum size [`RELAXED_MIN_SIZE`], maximum size the
    /// image area, any circularity, and no border or edge detection.
    #[must_use = "returns a relaxed copy; the original is unchanged"]
    pub fn relaxed(&self) -> Self {
        let mut relaxed = self.clone();
        relaxed.min_size = RELAXED_MIN_SIZE;
        relaxed.max_size = None;
        relaxed.min_circularity = 0.0;
        relaxed.max_circularity = 1.0;
        relaxed.filter.add_border = false;
        relaxed.filter.use_edge_detection = false;
        relaxed
    }
}

fn invalid(message: impl Into<String>) -> DetectionError {
    DetectionError::InvalidConfig(message.into())
}
