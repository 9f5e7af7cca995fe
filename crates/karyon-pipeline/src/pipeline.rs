//! The detection pipeline: filter, threshold, detect, build.
//!
//! A [`DetectionPipeline`] owns validated [`DetectionOptions`] and runs
//! one image at a time:
//!
//! ```rust
//! # use karyon_pipeline::{
//! #     CancellationToken, ComponentBuilder, ComponentKind, DetectionError,
//! #     DetectionOptions, DetectionPipeline, ImageSource, PixelBuffer,
//! # };
//! # fn run(buffer: &PixelBuffer) -> Result<(), DetectionError> {
//! let pipeline = DetectionPipeline::new(DetectionOptions::default())?;
//! let builder = ComponentBuilder::new(ComponentKind::Nucleus, ImageSource::new("a.tif", 2), 1.0);
//! let detected = pipeline.run(
//!     buffer,
//!     |region, index| builder.build(region, index),
//!     &CancellationToken::new(),
//! )?;
//! println!("{} nuclei", detected.components.len());
//! # Ok(())
//! # }
//! ```
//!
//! The pipeline is generic over what it produces: the factory closure
//! turns each accepted region into any component type, and regions the
//! factory refuses are reported in [`Detected::failures`] instead of
//! aborting the run.

use std::time::Instant;

use crate::buffer::{PixelAccess, PixelBuffer};
use crate::cancel::CancellationToken;
use crate::detector::{DetectedRegion, DetectionCriteria, Detector};
use crate::diagnostics::{PipelineDiagnostics, PipelineSummary, StageDiagnostics, StageMetrics};
use crate::edge;
use crate::error::{ComponentError, DetectionError};
use crate::filter::{FilterChain, FilterStep};
use crate::flatten;
use crate::options::{DetectionOptions, MAX_BORDER_WIDTH};
use crate::stats::Measurement;
use crate::threshold;
use crate::types::{Dimensions, Rect};

/// A region the factory could not turn into a component.
#[derive(Debug)]
pub struct CreationFailure {
    /// Index of the region in detection order.
    pub index: usize,
    /// Why the factory refused it.
    pub error: ComponentError,
}

/// Everything one pipeline run produced.
#[derive(Debug)]
pub struct Detected<C> {
    /// Components in detection order.
    pub components: Vec<C>,
    /// Regions skipped by the factory.
    pub failures: Vec<CreationFailure>,
    /// Per-stage timing and counts.
    pub diagnostics: PipelineDiagnostics,
}

/// Runs the filter chain, thresholding, and detection for one image.
#[derive(Debug, Clone)]
pub struct DetectionPipeline {
    options: DetectionOptions,
}

impl DetectionPipeline {
    /// A pipeline using `options`.
    ///
    /// # Errors
    ///
    /// Returns [`DetectionError::InvalidConfig`] when the options fail
    /// [`DetectionOptions::validate`].
    pub fn new(options: DetectionOptions) -> Result<Self, DetectionError> {
        options.validate()?;
        Ok(Self { options })
    }

    /// The validated options this pipeline runs with.
    #[must_use]
    pub const fn options(&self) -> &DetectionOptions {
        &self.options
    }

    /// A copy that pads the image with a `width`-pixel border before
    /// filtering. A width of 0 turns padding off; widths above
    /// [`MAX_BORDER_WIDTH`] are clamped to it.
    #[must_use = "returns a new pipeline; the original is unchanged"]
    pub fn with_border(&self, width: u32) -> Self {
        let mut options = self.options.clone();
        options.filter.add_border = width > 0;
        options.filter.border_width = width.min(MAX_BORDER_WIDTH);
        Self { options }
    }

    /// A copy with [`DetectionOptions::relaxed`] options.
    #[must_use = "returns a new pipeline; the original is unchanged"]
    pub fn relaxed(&self) -> Self {
        Self {
            options: self.options.relaxed(),
        }
    }

    /// A copy with `step` switched on or off.
    #[must_use = "returns a new pipeline; the original is unchanged"]
    pub fn with_step(&self, step: FilterStep, enabled: bool) -> Self {
        let mut options = self.options.clone();
        options.filter.set_enabled(step, enabled);
        Self { options }
    }

    /// Run only the filter chain, for inspecting what the detector will
    /// threshold.
    ///
    /// # Errors
    ///
    /// Returns [`DetectionError::InvalidConfig`] when the border cannot
    /// be added to an image this size.
    pub fn preprocess(&self, buffer: &PixelBuffer) -> Result<FilterChain, DetectionError> {
        FilterChain::from_buffer(buffer).apply_all(&self.options.filter)
    }

    /// Detect objects in `buffer` and build a component from each.
    ///
    /// `make_component` receives every accepted region, in source-image
    /// coordinates with an intensity-weighted centre of mass attached,
    /// and its index in detection order.
    ///
    /// # Errors
    ///
    /// Returns [`DetectionError::Cancelled`] when `cancel` fires between
    /// steps, or any error from the detector. Finding nothing is not an
    /// error.
    pub fn run<C, F>(
        &self,
        buffer: &PixelBuffer,
        mut make_component: F,
        cancel: &CancellationToken,
    ) -> Result<Detected<C>, DetectionError>
    where
        F: FnMut(&DetectedRegion, usize) -> Result<C, ComponentError>,
    {
        let total_start = Instant::now();
        cancel.check(DetectionError::Cancelled)?;
        let dims = buffer.dimensions();

        // 1. Greyscale.
        let start = Instant::now();
        let mut chain = FilterChain::from_buffer(buffer);
        let greyscale = StageDiagnostics {
            duration: start.elapsed(),
            metrics: StageMetrics::Greyscale {
                width: dims.width,
                height: dims.height,
                bit_depth: buffer.bit_depth(),
            },
        };

        // 2. Optional filter steps, in fixed order.
        let mut steps: [Option<StageDiagnostics>; 5] = Default::default();
        for (slot, step) in steps.iter_mut().zip(FilterStep::ORDER) {
            cancel.check(DetectionError::Cancelled)?;
            let (next, diagnostics) = self.run_step(chain, step)?;
            chain = next;
            *slot = diagnostics;
        }
        let [border, smoothing, flattening, edge_detection, gap_closing] = steps;
        cancel.check(DetectionError::Cancelled)?;

        // 3. Restore polarity and binarize.
        let start = Instant::now();
        let (image, border_width) = chain.into_detection_image();
        let binary = threshold::binarize(&image, self.options.threshold);
        let threshold = StageDiagnostics {
            duration: start.elapsed(),
            metrics: StageMetrics::Threshold {
                threshold: self.options.threshold,
                foreground_pixel_count: edge::count_foreground(&binary),
                total_pixel_count: u64::from(binary.width()) * u64::from(binary.height()),
            },
        };
        cancel.check(DetectionError::Cancelled)?;

        // 4. Detect inside the source area of the padded image.
        let start = Instant::now();
        let detection = self.detector(dims, border_width)?.detect(&binary)?;
        let detection_stage = StageDiagnostics {
            duration: start.elapsed(),
            metrics: StageMetrics::Detection(detection.counts),
        };

        // 5. Back to source coordinates, then build components.
        let start = Instant::now();
        let offset = i32::try_from(border_width).unwrap_or(i32::MAX);
        let mut components = Vec::with_capacity(detection.regions.len());
        let mut failures = Vec::new();
        for (index, region) in detection.regions.iter().enumerate() {
            cancel.check(DetectionError::Cancelled)?;
            let region = to_source(region, offset, buffer.as_access());
            match make_component(&region, index) {
                Ok(component) => components.push(component),
                Err(error) => {
                    tracing::warn!(index, %error, "skipping region");
                    failures.push(CreationFailure { index, error });
                }
            }
        }
        if !failures.is_empty() {
            tracing::warn!(
                skipped = failures.len(),
                created = components.len(),
                "some regions could not be built"
            );
        }
        let construction = StageDiagnostics {
            duration: start.elapsed(),
            metrics: StageMetrics::Construction {
                created: components.len(),
                skipped: failures.len(),
            },
        };

        let diagnostics = PipelineDiagnostics {
            greyscale,
            border,
            smoothing,
            flattening,
            edge_detection,
            gap_closing,
            threshold,
            detection: detection_stage,
            construction,
            total_duration: total_start.elapsed(),
            summary: PipelineSummary {
                image_width: dims.width,
                image_height: dims.height,
                pixel_count: dims.pixel_count(),
                accepted_regions: detection.regions.len(),
                component_count: components.len(),
            },
        };
        tracing::info!(
            width = dims.width,
            height = dims.height,
            candidates = detection.counts.candidates,
            accepted = detection.counts.accepted,
            components = components.len(),
            skipped = failures.len(),
            duration_ms = diagnostics.total_duration.as_secs_f64() * 1000.0,
            "detection run finished"
        );

        Ok(Detected {
            components,
            failures,
            diagnostics,
        })
    }

    /// The detector for a `source`-sized image padded by `border`.
    fn detector(&self, source: Dimensions, border: u32) -> Result<Detector, DetectionError> {
        let inset = i32::try_from(border).map_err(|_| {
            DetectionError::InvalidConfig(format!("border width {border} is too large"))
        })?;
        let mut criteria = DetectionCriteria::from_options(&self.options);
        criteria.max_size = Some(self.options.max_size_for(source));
        Ok(Detector::new(criteria)
            .with_active_rect(Rect::new(inset, inset, source.width, source.height)))
    }

    fn run_step(
        &self,
        chain: FilterChain,
        step: FilterStep,
    ) -> Result<(FilterChain, Option<StageDiagnostics>), DetectionError> {
        let filter = &self.options.filter;
        if !filter.is_enabled(step) {
            return Ok((chain, None));
        }
        let clamped = (step == FilterStep::Flattening)
            .then(|| flatten::count_clamped(chain.image(), filter.flatten_threshold, chain.is_inverted()))
            .unwrap_or(0);

        let start = Instant::now();
        let chain = chain.apply(step, filter)?;
        let duration = start.elapsed();

        let metrics = match step {
            FilterStep::Border => {
                let padded = chain.dimensions();
                StageMetrics::Border {
                    width: filter.border_width,
                    padded_width: padded.width,
                    padded_height: padded.height,
                }
            }
            FilterStep::Smoothing => StageMetrics::Smoothing {
                kernel: filter.smoothing_kernel | 1,
            },
            FilterStep::Flattening => StageMetrics::Flattening {
                ceiling: filter.flatten_threshold,
                clamped_pixel_count: clamped,
            },
            FilterStep::EdgeDetection => {
                let (low, high) = edge::clamp_thresholds(filter.canny_low, filter.canny_high);
                StageMetrics::EdgeDetection {
                    sigma: filter.canny_kernel_radius,
                    low_threshold: low,
                    high_threshold: high,
                    edge_pixel_count: edge::count_foreground(chain.image()),
                    total_pixel_count: chain.dimensions().pixel_count(),
                }
            }
            FilterStep::GapClosing => StageMetrics::GapClosing {
                radius: filter.closing_radius,
                foreground_pixel_count: edge::count_foreground(chain.image()),
            },
        };
        tracing::debug!(step = step.name(), ?duration, "filter step finished");
        Ok((chain, Some(StageDiagnostics { duration, metrics })))
    }
}

/// Shift a region found in the padded image back by `border` and attach
/// the centre of mass weighted by `source` intensities.
///
/// The weighting covers the filled outline. A region with zero total
/// intensity falls back to its centroid.
fn to_source(region: &DetectedRegion, border: i32, source: &dyn PixelAccess) -> DetectedRegion {
    let roi = region.roi.translate(-border, -border);
    let mut stats = region.stats.clone();
    let shift = f64::from(border);
    for m in [Measurement::CentroidX, Measurement::CentroidY] {
        if let Ok(v) = stats.get(m) {
            stats.add(m, v - shift);
        }
    }

    let bounds = roi.bounds();
    let mask = roi.mask();
    let dims = source.dimensions();
    let (mut sum_x, mut sum_y, mut total) = (0.0_f64, 0.0_f64, 0.0_f64);
    for j in 0..mask.height() {
        for i in 0..mask.width() {
            if !mask.is_set(i64::from(i), i64::from(j)) {
                continue;
            }
            let (x, y) = (
                i64::from(bounds.x) + i64::from(i),
                i64::from(bounds.y) + i64::from(j),
            );
            let (Ok(px), Ok(py)) = (u32::try_from(x), u32::try_from(y)) else {
                continue;
            };
            if px >= dims.width || py >= dims.height {
                continue;
            }
            let weight = f64::from(source.value(px, py));
            sum_x += weight * (f64::from(px) + 0.5);
            sum_y += weight * (f64::from(py) + 0.5);
            total += weight;
        }
    }
    let centre = if total > 0.0 {
        Some((sum_x / total, sum_y / total))
    } else {
        stats
            .get(Measurement::CentroidX)
            .ok()
            .zip(stats.get(Measurement::CentroidY).ok())
    };
    if let Some((x, y)) = centre {
        stats.add(Measurement::CentreOfMassX, x);
        stats.add(Measurement::CentreOfMassY, y);
    }
    DetectedRegion { roi, stats }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::options::FilterOptions;
    use crate::types::GrayImage;
    use image::Luma;

    fn disk_image(size: u32, cx: i64, cy: i64, r: i64) -> PixelBuffer {
        GrayImage::from_fn(size, size, |x, y| {
            let (dx, dy) = (i64::from(x) - cx, i64::from(y) - cy);
            Luma([if dx * dx + dy * dy <= r * r { 200 } else { 10 }])
        })
        .into()
    }

    fn options() -> DetectionOptions {
        DetectionOptions {
            threshold: 128,
            min_size: 50,
            max_size: Some(2500),
            min_circularity: 0.5,
            max_circularity: 1.0,
            filter: FilterOptions::disabled(),
            ..DetectionOptions::default()
        }
    }

    fn regions(
        pipeline: &DetectionPipeline,
        buffer: &PixelBuffer,
    ) -> Result<Detected<DetectedRegion>, DetectionError> {
        pipeline.run(buffer, |region, _| Ok(region.clone()), &CancellationToken::new())
    }

    #[test]
    fn invalid_options_are_rejected() {
        let bad = DetectionOptions {
            min_size: 5000,
            max_size: Some(100),
            ..options()
        };
        assert!(matches!(
            DetectionPipeline::new(bad),
            Err(DetectionError::InvalidConfig(_))
        ));
    }

    #[test]
    fn finds_one_disk() {
        let pipeline = DetectionPipeline::new(options()).unwrap();
        let detected = regions(&pipeline, &disk_image(50, 25, 25, 10)).unwrap();
        assert_eq!(detected.components.len(), 1);
        assert!(detected.failures.is_empty());
        let region = &detected.components[0];
        let com_x = region.stats.get(Measurement::CentreOfMassX).unwrap();
        assert!((com_x - 25.5).abs() < 0.01, "expected centre near 25.5, got {com_x}");
    }

    #[test]
    fn border_does_not_move_results() {
        let buffer = disk_image(50, 25, 25, 10);
        let plain = DetectionPipeline::new(options()).unwrap();
        let padded = plain.with_border(4);
        let a = regions(&plain, &buffer).unwrap();
        let b = regions(&padded, &buffer).unwrap();
        assert_eq!(a.components.len(), 1);
        assert_eq!(b.components.len(), 1);
        assert_eq!(a.components[0].roi, b.components[0].roi);
        assert_eq!(
            a.components[0].stats.get(Measurement::CentroidX),
            b.components[0].stats.get(Measurement::CentroidX)
        );
        assert!(b.diagnostics.border.is_some());
    }

    #[test]
    fn nothing_found_is_not_an_error() {
        let pipeline = DetectionPipeline::new(options()).unwrap();
        let flat: PixelBuffer = GrayImage::new(30, 30).into();
        let detected = regions(&pipeline, &flat).unwrap();
        assert!(detected.components.is_empty());
        assert_eq!(detected.diagnostics.summary.accepted_regions, 0);
    }

    #[test]
    fn factory_failures_are_collected() {
        let pipeline = DetectionPipeline::new(options()).unwrap();
        let detected: Detected<()> = pipeline
            .run(
                &disk_image(50, 25, 25, 10),
                |_, _| Err(ComponentError::Rejected("test".to_owned())),
                &CancellationToken::new(),
            )
            .unwrap();
        assert!(detected.components.is_empty());
        assert_eq!(detected.failures.len(), 1);
        assert_eq!(detected.failures[0].index, 0);
    }

    #[test]
    fn cancelled_run_returns_error() {
        let pipeline = DetectionPipeline::new(options()).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = pipeline.run(&disk_image(20, 10, 10, 4), |r, _| Ok(r.clone()), &cancel);
        assert!(matches!(result, Err(DetectionError::Cancelled)));
    }

    #[test]
    fn mutators_leave_original_untouched() {
        let pipeline = DetectionPipeline::new(options()).unwrap();
        let relaxed = pipeline.relaxed();
        let smoothed = pipeline.with_step(FilterStep::Smoothing, true);
        assert_eq!(pipeline.options().min_size, 50);
        assert_eq!(relaxed.options().max_size, None);
        assert!(smoothed.options().filter.use_smoothing);
        assert!(!pipeline.options().filter.use_smoothing);
    }

    #[test]
    fn enabled_steps_report_diagnostics() {
        let pipeline = DetectionPipeline::new(options())
            .unwrap()
            .with_step(FilterStep::Smoothing, true)
            .with_step(FilterStep::Flattening, true);
        let detected = regions(&pipeline, &disk_image(50, 25, 25, 10)).unwrap();
        let d = &detected.diagnostics;
        assert!(d.smoothing.is_some());
        assert!(d.flattening.is_some());
        assert!(d.edge_detection.is_none());
        let names: Vec<&str> = d.stages().iter().map(|(name, _)| *name).collect();
        assert_eq!(
            names,
            ["Greyscale", "Smoothing", "Flattening", "Threshold", "Detection", "Construction"]
        );
    }

    #[test]
    fn with_border_clamps_width() {
        let pipeline = DetectionPipeline::new(options()).unwrap().with_border(u32::MAX);
        assert_eq!(pipeline.options().filter.border_width, MAX_BORDER_WIDTH);
        pipeline.options().validate().unwrap();
        assert!(!pipeline.with_border(0).options().filter.add_border);
    }

    #[test]
    fn preprocess_exposes_filtered_image() {
        let pipeline = DetectionPipeline::new(options()).unwrap().with_border(3);
        let chain = pipeline.preprocess(&disk_image(20, 10, 10, 4)).unwrap();
        assert!(chain.is_inverted());
        assert_eq!(chain.border_width(), 3);
    }
}
