//! karyon-pipeline: Detection and normalization of cell nuclei in
//! microscopy images (sans-IO).
//!
//! Turns one channel of a fluorescence image into measured object
//! outlines through:
//! greyscale -> border -> smoothing -> flattening -> edge detection ->
//! gap closing -> threshold -> boundary tracing -> filtering ->
//! component construction, with an optional parallel alignment pass
//! afterwards.
//!
//! This crate has **no I/O dependencies** -- it operates on decoded
//! in-memory images and returns structured data. File loading and
//! reporting live in `karyon-bench`.

pub mod align;
pub mod border;
pub mod buffer;
pub mod cancel;
pub mod component;
pub mod detector;
pub mod diagnostics;
pub mod edge;
pub mod error;
pub mod filter;
pub mod flatten;
pub mod flood;
pub mod grayscale;
pub mod mask;
pub mod morphology;
pub mod options;
pub mod pipeline;
pub mod roi;
pub mod smooth;
pub mod stats;
pub mod threshold;
pub mod trace;
pub mod types;

pub use align::{Alignable, MaskAligner, Shift};
pub use buffer::{PixelAccess, PixelBuffer};
pub use cancel::CancellationToken;
pub use component::{CellularComponent, ComponentBuilder, ComponentKind, ImageSource};
pub use detector::{
    DetectedRegion, Detection, DetectionCounts, DetectionCriteria, Detector, ThresholdBand,
};
pub use diagnostics::PipelineDiagnostics;
pub use error::{AlignError, ComponentError, DetectionError, MaskError, StatsError};
pub use filter::{FilterChain, FilterStep};
pub use mask::BooleanMask;
pub use options::{DetectionOptions, FilterOptions};
pub use pipeline::{CreationFailure, Detected, DetectionPipeline};
pub use roi::Roi;
pub use stats::{Measurement, StatsMap};
pub use trace::{BoundaryTracer, Connectivity};
pub use types::{Dimensions, PixelPoint, Point, Rect};

use image::DynamicImage;

/// Detect components of one kind in a decoded image.
///
/// Picks `options.channel` from `image`, runs the [`DetectionPipeline`],
/// and builds a [`CellularComponent`] per accepted region.
///
/// # Pipeline steps
///
/// 1. Channel extraction and conversion to 8-bit greyscale
/// 2. Optional border padding (inverts polarity)
/// 3. Optional Kuwahara smoothing
/// 4. Optional bright-region flattening
/// 5. Optional Gaussian blur and Canny edge detection
/// 6. Optional gap closing (dilate, fill holes, erode)
/// 7. Polarity restore and binarization at `options.threshold`
/// 8. Boundary tracing with edge, size, and circularity filters
/// 9. Component construction
///
/// With `relaxed_retry`, a run that finds nothing is repeated once with
/// [`DetectionOptions::relaxed`].
///
/// # Errors
///
/// Returns [`DetectionError::InvalidConfig`] if `options` are invalid,
/// [`DetectionError::UnsupportedBuffer`] if the channel cannot be read,
/// and [`DetectionError::Cancelled`] if `cancel` fires.
pub fn detect(
    image: &DynamicImage,
    kind: ComponentKind,
    source: ImageSource,
    options: &DetectionOptions,
    relaxed_retry: bool,
    cancel: &CancellationToken,
) -> Result<Detected<CellularComponent>, DetectionError> {
    let pipeline = DetectionPipeline::new(options.clone())?;
    let buffer = grayscale::extract_channel(image, options.channel)?;
    let builder = ComponentBuilder::new(kind, source, options.scale);
    let build = |region: &DetectedRegion, index: usize| builder.build(region, index);

    let detected = pipeline.run(&buffer, build, cancel)?;
    if detected.components.is_empty() && relaxed_retry {
        tracing::info!("no {kind} found; retrying with relaxed options");
        return pipeline.relaxed().run(&buffer, build, cancel);
    }
    Ok(detected)
}
