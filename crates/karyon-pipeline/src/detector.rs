//! Connected-component detection with shape filtering.
//!
//! The detector raster-scans a single-channel image for pixels inside a
//! threshold band, traces the outline of each region it meets, measures
//! it, and keeps regions that pass the edge, size, and circularity
//! filters. Each region is visited once whether it is kept or not.
//!
//! All working state lives inside one [`Detector::detect`] call, so a
//! detector can be shared across threads.

use std::f64::consts::PI;

use geo::Contains;
use serde::{Deserialize, Serialize};

use crate::buffer::{PixelAccess, PixelBuffer};
use crate::error::DetectionError;
use crate::flood::flood_fill;
use crate::mask::BooleanMask;
use crate::options::DetectionOptions;
use crate::roi::Roi;
use crate::stats::{Measurement, StatsMap};
use crate::trace::{BoundaryTracer, Connectivity};
use crate::types::{PixelPoint, Rect};

/// Smallest object the permissive detector reports, in pixels.
pub const MINIMUM_OBJECT_SIZE: u64 = 5;

/// An inclusive band of pixel values counted as foreground.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdBand {
    /// Lowest foreground value.
    pub low: u32,
    /// Highest foreground value.
    pub high: u32,
}

impl ThresholdBand {
    /// The band `[low, high]`.
    #[must_use]
    pub const fn new(low: u32, high: u32) -> Self {
        Self { low, high }
    }

    /// The band holding only full-intensity 8-bit pixels.
    pub const BINARY_FOREGROUND: Self = Self::new(255, 255);

    /// Whether `value` is foreground.
    #[must_use]
    pub const fn contains(&self, value: u32) -> bool {
        value >= self.low && value <= self.high
    }

    /// Whether every value up to `max_value` is foreground.
    #[must_use]
    pub const fn covers(&self, max_value: u32) -> bool {
        self.low == 0 && self.high >= max_value
    }
}

/// Which regions the detector keeps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionCriteria {
    /// Smallest accepted pixel count (inclusive).
    pub min_size: u64,
    /// Largest accepted pixel count (inclusive); `None` means the area
    /// of the scanned rectangle.
    pub max_size: Option<u64>,
    /// Lowest accepted circularity (inclusive).
    pub min_circularity: f64,
    /// Highest accepted circularity (inclusive).
    pub max_circularity: f64,
    /// Count enclosed holes toward a region's area.
    pub include_holes: bool,
    /// Reject regions whose bounds touch the scanned rectangle's edge.
    pub exclude_edges: bool,
    /// Neighbourhood used for tracing and filling.
    pub connectivity: Connectivity,
}

impl DetectionCriteria {
    /// Criteria matching `options`.
    #[must_use]
    pub fn from_options(options: &DetectionOptions) -> Self {
        Self {
            min_size: options.min_size,
            max_size: options.max_size,
            min_circularity: options.min_circularity,
            max_circularity: options.max_circularity,
            include_holes: options.include_holes,
            exclude_edges: options.exclude_edges,
            connectivity: options.connectivity,
        }
    }

    /// Criteria that keep every region of at least
    /// [`MINIMUM_OBJECT_SIZE`] pixels, edge-touching or not.
    #[must_use]
    pub const fn permissive() -> Self {
        Self {
            min_size: MINIMUM_OBJECT_SIZE,
            max_size: None,
            min_circularity: 0.0,
            max_circularity: 1.0,
            include_holes: true,
            exclude_edges: false,
            connectivity: Connectivity::Eight,
        }
    }

    fn validate(&self, max_size: u64) -> Result<(), DetectionError> {
        if !self.min_circularity.is_finite() || !self.max_circularity.is_finite() {
            return Err(DetectionError::InvalidConfig(
                "circularity bounds must be finite".to_owned(),
            ));
        }
        if self.min_circularity >= self.max_circularity {
            return Err(DetectionError::InvalidConfig(format!(
                "min_circularity {} must be below max_circularity {}",
                self.min_circularity, self.max_circularity
            )));
        }
        if self.min_size >= max_size {
            return Err(DetectionError::InvalidConfig(format!(
                "min_size {} must be below max_size {max_size}",
                self.min_size
            )));
        }
        Ok(())
    }
}

/// One region that passed every filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedRegion {
    /// The traced outline.
    pub roi: Roi,
    /// Area, perimeter, circularity, Feret diameter, and centroid.
    pub stats: StatsMap,
}

/// How many regions were seen and why they were dropped.
///
/// A rejected region counts under the first filter it fails, in the
/// order edge, size, circularity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionCounts {
    /// Regions traced.
    pub candidates: usize,
    /// Regions touching the scanned rectangle's edge.
    pub rejected_edge: usize,
    /// Regions outside the size range.
    pub rejected_size: usize,
    /// Regions outside the circularity range.
    pub rejected_circularity: usize,
    /// Regions kept.
    pub accepted: usize,
}

/// The result of one detection call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Detection {
    /// Accepted regions in scan order.
    pub regions: Vec<DetectedRegion>,
    /// Filter bookkeeping.
    pub counts: DetectionCounts,
}

impl Detection {
    /// Number of accepted regions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Whether no region was accepted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Keep only regions whose centroid lies inside `container`, such
    /// as signals inside a nucleus outline.
    pub fn retain_within(&mut self, container: &Roi) {
        let polygon = container.to_polygon();
        self.regions.retain(|region| {
            match (
                region.stats.get(Measurement::CentroidX),
                region.stats.get(Measurement::CentroidY),
            ) {
                (Ok(x), Ok(y)) => polygon.contains(&geo::Point::new(x, y)),
                _ => false,
            }
        });
    }
}

/// `4π·area/perimeter²`, clamped to at most 1. Zero perimeter gives 0.
#[must_use]
pub fn circularity(area: f64, perimeter: f64) -> f64 {
    if perimeter <= 0.0 {
        return 0.0;
    }
    (4.0 * PI * area / (perimeter * perimeter)).min(1.0)
}

/// Finds and filters connected regions.
#[derive(Debug, Clone)]
pub struct Detector {
    criteria: DetectionCriteria,
    band: Option<ThresholdBand>,
    active: Option<Rect>,
}

impl Detector {
    /// A detector with `criteria`, no explicit band, scanning the whole
    /// image.
    #[must_use]
    pub const fn new(criteria: DetectionCriteria) -> Self {
        Self {
            criteria,
            band: None,
            active: None,
        }
    }

    /// A detector with [`DetectionCriteria::permissive`] criteria.
    #[must_use]
    pub const fn permissive() -> Self {
        Self::new(DetectionCriteria::permissive())
    }

    /// Use `band` as the foreground range.
    ///
    /// Without a band, 8-bit images use [`ThresholdBand::BINARY_FOREGROUND`]
    /// and 16-bit images are rejected.
    #[must_use]
    pub const fn with_band(mut self, band: ThresholdBand) -> Self {
        self.band = Some(band);
        self
    }

    /// Scan only `rect`. Edge exclusion applies to its sides.
    #[must_use]
    pub const fn with_active_rect(mut self, rect: Rect) -> Self {
        self.active = Some(rect);
        self
    }

    /// The criteria in use.
    #[must_use]
    pub const fn criteria(&self) -> &DetectionCriteria {
        &self.criteria
    }

    /// Detect regions in a [`PixelBuffer`].
    ///
    /// # Errors
    ///
    /// See [`detect`](Self::detect).
    pub fn detect_buffer(&self, buffer: &PixelBuffer) -> Result<Detection, DetectionError> {
        match buffer {
            PixelBuffer::Gray8(img) => self.detect(img),
            PixelBuffer::Gray16(img) => self.detect(img),
        }
    }

    /// Detect regions in `image`.
    ///
    /// # Errors
    ///
    /// Returns [`DetectionError::InvalidConfig`] when the criteria are
    /// inconsistent (checked before any pixel is read), when the active
    /// rectangle misses the image, or when a 16-bit image is scanned
    /// without an explicit band.
    pub fn detect<P: PixelAccess + ?Sized>(&self, image: &P) -> Result<Detection, DetectionError> {
        let dims = image.dimensions();
        let whole = Rect::from_dimensions(dims);
        let active = match self.active {
            Some(rect) => rect.intersect(&whole).ok_or_else(|| {
                DetectionError::InvalidConfig(format!(
                    "active rectangle {rect:?} lies outside the {}x{} image",
                    dims.width, dims.height
                ))
            })?,
            None => whole,
        };
        let max_size = self.criteria.max_size.unwrap_or_else(|| active.area());
        self.criteria.validate(max_size)?;

        let band = match self.band {
            Some(band) => band,
            None if image.max_value() <= u32::from(u8::MAX) => ThresholdBand::BINARY_FOREGROUND,
            None => {
                return Err(DetectionError::InvalidConfig(
                    "a threshold band is required for 16-bit images".to_owned(),
                ));
            }
        };
        let single_region = band.covers(image.max_value());
        let max_steps = trace_step_limit(active);

        let mut visited = BooleanMask::new(dims.width, dims.height);
        let mut detection = Detection::default();

        let (x_start, y_start) = (active.x, active.y);
        let x_end = i32::try_from(active.right()).unwrap_or(i32::MAX);
        let y_end = i32::try_from(active.bottom()).unwrap_or(i32::MAX);

        'scan: for y in y_start..y_end {
            for x in x_start..x_end {
                if visited.is_set(i64::from(x), i64::from(y)) || !in_band(image, band, x, y) {
                    continue;
                }
                let seed = PixelPoint::new(x, y);
                let (roi, region) = {
                    let inside = |px: i32, py: i32| {
                        active.contains(i64::from(px), i64::from(py))
                            && !visited.is_set(i64::from(px), i64::from(py))
                            && in_band(image, band, px, py)
                    };
                    let vertices = self.criteria.connectivity.trace(seed, &inside, max_steps);
                    if vertices.is_empty() {
                        (None, None)
                    } else {
                        let roi = Roi::new(vertices);
                        let region = if self.criteria.include_holes {
                            roi.mask()
                        } else {
                            flood_fill(seed, roi.bounds(), inside, self.criteria.connectivity)
                        };
                        (Some(roi), Some(region))
                    }
                };
                let (Some(roi), Some(region)) = (roi, region) else {
                    visited.set(i64::from(x), i64::from(y), true)?;
                    continue;
                };

                detection.counts.candidates += 1;
                let verdict = self.judge(&roi, &region, active, max_size);
                mark_visited(&mut visited, &region, roi.bounds())?;
                match verdict {
                    Verdict::Accept { area, perimeter } => {
                        detection.counts.accepted += 1;
                        let stats = measure(&roi, &region, area, perimeter);
                        detection.regions.push(DetectedRegion { roi, stats });
                    }
                    Verdict::Edge => detection.counts.rejected_edge += 1,
                    Verdict::Size => detection.counts.rejected_size += 1,
                    Verdict::Circularity => detection.counts.rejected_circularity += 1,
                }
                if single_region {
                    break 'scan;
                }
            }
        }

        tracing::debug!(
            candidates = detection.counts.candidates,
            accepted = detection.counts.accepted,
            rejected_edge = detection.counts.rejected_edge,
            rejected_size = detection.counts.rejected_size,
            rejected_circularity = detection.counts.rejected_circularity,
            "detection finished"
        );
        Ok(detection)
    }

    fn judge(&self, roi: &Roi, region: &BooleanMask, active: Rect, max_size: u64) -> Verdict {
        if self.criteria.exclude_edges && roi.bounds().touches_edge_of(&active) {
            return Verdict::Edge;
        }
        let pixels = region.count();
        if pixels < self.criteria.min_size || pixels > max_size {
            return Verdict::Size;
        }
        #[allow(clippy::cast_precision_loss)]
        let area = pixels as f64;
        let perimeter = roi.traced_perimeter();
        let circ = circularity(area, perimeter);
        if circ < self.criteria.min_circularity || circ > self.criteria.max_circularity {
            return Verdict::Circularity;
        }
        Verdict::Accept { area, perimeter }
    }
}

enum Verdict {
    Accept { area: f64, perimeter: f64 },
    Edge,
    Size,
    Circularity,
}

fn in_band<P: PixelAccess + ?Sized>(image: &P, band: ThresholdBand, x: i32, y: i32) -> bool {
    match (u32::try_from(x), u32::try_from(y)) {
        (Ok(x), Ok(y)) => band.contains(image.value(x, y)),
        _ => false,
    }
}

/// Upper bound on crack steps for any closed outline inside `rect`.
fn trace_step_limit(rect: Rect) -> usize {
    let corners = (u64::from(rect.width) + 1) * (u64::from(rect.height) + 1);
    usize::try_from(corners.saturating_mul(4)).unwrap_or(usize::MAX)
}

fn mark_visited(
    visited: &mut BooleanMask,
    region: &BooleanMask,
    bounds: Rect,
) -> Result<(), DetectionError> {
    for j in 0..region.height() {
        for i in 0..region.width() {
            if region.is_set(i64::from(i), i64::from(j)) {
                visited.set(
                    i64::from(bounds.x) + i64::from(i),
                    i64::from(bounds.y) + i64::from(j),
                    true,
                )?;
            }
        }
    }
    Ok(())
}

fn measure(roi: &Roi, region: &BooleanMask, area: f64, perimeter: f64) -> StatsMap {
    let bounds = roi.bounds();
    let (mut sum_x, mut sum_y, mut n) = (0.0_f64, 0.0_f64, 0.0_f64);
    for j in 0..region.height() {
        for i in 0..region.width() {
            if region.is_set(i64::from(i), i64::from(j)) {
                sum_x += f64::from(bounds.x) + f64::from(i) + 0.5;
                sum_y += f64::from(bounds.y) + f64::from(j) + 0.5;
                n += 1.0;
            }
        }
    }
    let mut stats = StatsMap::new();
    stats.add(Measurement::Area, area);
    stats.add(Measurement::Perimeter, perimeter);
    stats.add(Measurement::Circularity, circularity(area, perimeter));
    stats.add(Measurement::Feret, roi.feret());
    if n > 0.0 {
        stats.add(Measurement::CentroidX, sum_x / n);
        stats.add(Measurement::CentroidY, sum_y / n);
    }
    stats
}
