//! Detected cellular components and the factory that builds them.
//!
//! A [`CellularComponent`] owns the outline of one nucleus or cytoplasm
//! region, its measurements, and a shared descriptor of the image it
//! came from. The pipeline produces components through a caller-chosen
//! factory; [`ComponentBuilder`] is the stock factory.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use geo::{Contains, LineString, Polygon};
use serde::{Deserialize, Serialize};

use crate::align::Alignable;
use crate::detector::DetectedRegion;
use crate::error::{ComponentError, StatsError};
use crate::mask::BooleanMask;
use crate::roi::Roi;
use crate::stats::{Measurement, StatsMap};
use crate::types::Point;

/// Fewest outline vertices that can enclose an area.
const MIN_VERTICES: usize = 4;

/// The biological role of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentKind {
    /// A cell nucleus.
    Nucleus,
    /// The cytoplasm around a nucleus.
    Cytoplasm,
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nucleus => f.write_str("nucleus"),
            Self::Cytoplasm => f.write_str("cytoplasm"),
        }
    }
}

/// Where a component was found. Shared by every component of one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSource {
    /// Image file path.
    pub path: PathBuf,
    /// Colour channel that was analysed.
    pub channel: u32,
}

impl ImageSource {
    /// Describe channel `channel` of the image at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, channel: u32) -> Self {
        Self {
            path: path.into(),
            channel,
        }
    }
}

/// One detected object.
#[derive(Debug, Clone)]
pub struct CellularComponent {
    kind: ComponentKind,
    number: usize,
    roi: Roi,
    source: Arc<ImageSource>,
    scale: f64,
    stats: StatsMap,
    centre_of_mass: Point,
    orientation: f64,
    offset: Point,
}

impl CellularComponent {
    /// Build a component from a detected region.
    ///
    /// `scale` is pixels per physical unit. The centre of mass is taken
    /// from the intensity-weighted measurements when present and from
    /// the centroid otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::MissingMeasurement`] when area,
    /// perimeter, Feret diameter, or centroid is missing, and
    /// [`ComponentError::DegenerateBoundary`] when the outline has fewer
    /// than four vertices.
    pub fn from_region(
        kind: ComponentKind,
        number: usize,
        region: &DetectedRegion,
        source: Arc<ImageSource>,
        scale: f64,
    ) -> Result<Self, ComponentError> {
        let stats = &region.stats;
        for required in [
            Measurement::Area,
            Measurement::Perimeter,
            Measurement::Feret,
            Measurement::CentroidX,
            Measurement::CentroidY,
        ] {
            stats.get(required)?;
        }
        if region.roi.len() < MIN_VERTICES {
            return Err(ComponentError::DegenerateBoundary {
                vertices: region.roi.len(),
            });
        }
        if !scale.is_finite() || scale <= 0.0 {
            return Err(ComponentError::Rejected(format!(
                "scale must be positive, got {scale}"
            )));
        }

        let centre_of_mass = match (
            stats.get(Measurement::CentreOfMassX),
            stats.get(Measurement::CentreOfMassY),
        ) {
            (Ok(x), Ok(y)) => Point::new(x, y),
            _ => Point::new(
                stats.get(Measurement::CentroidX)?,
                stats.get(Measurement::CentroidY)?,
            ),
        };

        Ok(Self {
            kind,
            number,
            orientation: principal_angle(&region.roi),
            roi: region.roi.clone(),
            source,
            scale,
            stats: stats.clone(),
            centre_of_mass,
            offset: Point::ORIGIN,
        })
    }

    #[must_use]
    pub const fn kind(&self) -> ComponentKind {
        self.kind
    }

    /// Position in detection order, starting at 0.
    #[must_use]
    pub const fn number(&self) -> usize {
        self.number
    }

    /// The outline in source-image pixel coordinates.
    #[must_use]
    pub const fn roi(&self) -> &Roi {
        &self.roi
    }

    #[must_use]
    pub fn source(&self) -> &ImageSource {
        &self.source
    }

    /// Pixels per physical unit.
    #[must_use]
    pub const fn scale(&self) -> f64 {
        self.scale
    }

    #[must_use]
    pub const fn stats(&self) -> &StatsMap {
        &self.stats
    }

    /// Centre of mass in source pixel coordinates, as detected.
    ///
    /// Alignment leaves this unchanged; see
    /// [`aligned_centre_of_mass`](Self::aligned_centre_of_mass).
    #[must_use]
    pub const fn centre_of_mass(&self) -> Point {
        self.centre_of_mass
    }

    /// Centre of mass in source pixel coordinates after alignment.
    ///
    /// The alignment offset lives in the vertical frame; it is rotated
    /// back into the source frame and added to the detected centre.
    #[must_use]
    pub fn aligned_centre_of_mass(&self) -> Point {
        let (sin, cos) = self.to_vertical().sin_cos();
        let Point { x, y } = self.offset;
        self.centre_of_mass
            .translated(x.mul_add(cos, y * sin), y.mul_add(cos, -x * sin))
    }

    /// Angle of the principal axis from the x axis, in radians.
    #[must_use]
    pub const fn orientation(&self) -> f64 {
        self.orientation
    }

    /// Total translation applied by alignment, in the vertical frame.
    #[must_use]
    pub const fn offset(&self) -> Point {
        self.offset
    }

    /// A raw measurement in pixel units.
    ///
    /// # Errors
    ///
    /// Returns [`StatsError::Missing`] when it was never recorded.
    pub fn measurement(&self, measurement: Measurement) -> Result<f64, StatsError> {
        self.stats.get(measurement)
    }

    /// A measurement converted to physical units: areas divide by
    /// `scale²`, lengths and positions by `scale`, ratios are unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`StatsError::Missing`] when it was never recorded.
    pub fn scaled_measurement(&self, measurement: Measurement) -> Result<f64, StatsError> {
        let raw = self.stats.get(measurement)?;
        Ok(match measurement {
            Measurement::Area => raw / (self.scale * self.scale),
            m if m.is_dimensional() => raw / self.scale,
            _ => raw,
        })
    }

    /// The outline rotated so its principal axis is vertical, centred
    /// on the centre of mass and shifted by the alignment offset,
    /// sampled on a `width × height` grid whose centre cell is the
    /// origin.
    #[must_use]
    pub fn vertical_mask(&self, width: u32, height: u32) -> BooleanMask {
        let (sin, cos) = self.to_vertical().sin_cos();
        let com = self.centre_of_mass;
        let ring: Vec<(f64, f64)> = self
            .roi
            .vertices()
            .iter()
            .map(|v| {
                let x = f64::from(v.x) - com.x;
                let y = f64::from(v.y) - com.y;
                (
                    x.mul_add(cos, -y * sin) + self.offset.x,
                    x.mul_add(sin, y * cos) + self.offset.y,
                )
            })
            .collect();
        let polygon = Polygon::new(LineString::from(ring), vec![]);

        let half_x = i64::from(width / 2);
        let half_y = i64::from(height / 2);
        BooleanMask::from_fn(width, height, |i, j| {
            #[allow(clippy::cast_precision_loss)]
            let sample = geo::Point::new(
                (i64::from(i) - half_x) as f64,
                (i64::from(j) - half_y) as f64,
            );
            polygon.contains(&sample)
        })
    }

    /// Translate by `(dx, dy)` pixels in the aligned frame.
    pub fn move_centre_of_mass(&mut self, dx: f64, dy: f64) {
        self.offset = self.offset.translated(dx, dy);
    }

    /// Rotation taking the principal axis to vertical.
    fn to_vertical(&self) -> f64 {
        std::f64::consts::FRAC_PI_2 - self.orientation
    }
}

impl Alignable for CellularComponent {
    fn alignment_mask(&self, width: u32, height: u32) -> BooleanMask {
        self.vertical_mask(width, height)
    }

    fn move_centre_of_mass(&mut self, dx: f64, dy: f64) {
        Self::move_centre_of_mass(self, dx, dy);
    }
}

/// Angle of the principal axis of the filled outline, from its
/// second-order central moments.
fn principal_angle(roi: &Roi) -> f64 {
    let mask = roi.mask();
    let bounds = roi.bounds();
    let mut cells = Vec::new();
    for j in 0..mask.height() {
        for i in 0..mask.width() {
            if mask.is_set(i64::from(i), i64::from(j)) {
                cells.push((
                    f64::from(bounds.x) + f64::from(i) + 0.5,
                    f64::from(bounds.y) + f64::from(j) + 0.5,
                ));
            }
        }
    }
    if cells.is_empty() {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = cells.len() as f64;
    let mean_x = cells.iter().map(|c| c.0).sum::<f64>() / n;
    let mean_y = cells.iter().map(|c| c.1).sum::<f64>() / n;
    let (mut mu20, mut mu02, mut mu11) = (0.0, 0.0, 0.0);
    for (x, y) in &cells {
        let (dx, dy) = (x - mean_x, y - mean_y);
        mu20 += dx * dx;
        mu02 += dy * dy;
        mu11 += dx * dy;
    }
    0.5 * (2.0 * mu11).atan2(mu20 - mu02)
}

/// Builds components of one kind from one image.
///
/// Numbers components by detection index.
#[derive(Debug, Clone)]
pub struct ComponentBuilder {
    kind: ComponentKind,
    source: Arc<ImageSource>,
    scale: f64,
}

impl ComponentBuilder {
    #[must_use]
    pub fn new(kind: ComponentKind, source: ImageSource, scale: f64) -> Self {
        Self {
            kind,
            source: Arc::new(source),
            scale,
        }
    }

    /// Build the component for the `index`-th detected region.
    ///
    /// # Errors
    ///
    /// See [`CellularComponent::from_region`].
    pub fn build(
        &self,
        region: &DetectedRegion,
        index: usize,
    ) -> Result<CellularComponent, ComponentError> {
        CellularComponent::from_region(
            self.kind,
            index,
            region,
            Arc::clone(&self.source),
            self.scale,
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::PixelPoint;

    fn rect_region(x: i32, y: i32, w: i32, h: i32) -> DetectedRegion {
        let roi = Roi::new(vec![
            PixelPoint::new(x, y),
            PixelPoint::new(x, y + h),
            PixelPoint::new(x + w, y + h),
            PixelPoint::new(x + w, y),
        ]);
        let area = f64::from(w * h);
        let stats: StatsMap = [
            (Measurement::Area, area),
            (Measurement::Perimeter, f64::from(2 * (w + h))),
            (Measurement::Circularity, 0.5),
            (Measurement::Feret, f64::from(w).hypot(f64::from(h))),
            (Measurement::CentroidX, f64::from(x) + f64::from(w) / 2.0),
            (Measurement::CentroidY, f64::from(y) + f64::from(h) / 2.0),
        ]
        .into_iter()
        .collect();
        DetectedRegion { roi, stats }
    }

    fn builder(scale: f64) -> ComponentBuilder {
        ComponentBuilder::new(ComponentKind::Nucleus, ImageSource::new("a.tif", 2), scale)
    }

    #[test]
    fn builds_from_complete_region() {
        let c = builder(1.0).build(&rect_region(10, 10, 4, 6), 3).unwrap();
        assert_eq!(c.kind(), ComponentKind::Nucleus);
        assert_eq!(c.number(), 3);
        assert_eq!(c.source().channel, 2);
        assert_eq!(c.centre_of_mass(), Point::new(12.0, 13.0));
    }

    #[test]
    fn missing_measurement_is_reported() {
        let mut region = rect_region(0, 0, 4, 4);
        region.stats = region
            .stats
            .iter()
            .filter(|(m, _)| *m != Measurement::Feret)
            .collect();
        let err = builder(1.0).build(&region, 0).unwrap_err();
        assert!(
            matches!(
                err,
                ComponentError::MissingMeasurement(StatsError::Missing(Measurement::Feret))
            ),
            "expected missing Feret, got {err:?}"
        );
    }

    #[test]
    fn degenerate_outline_is_rejected() {
        let mut region = rect_region(0, 0, 4, 4);
        region.roi = Roi::new(vec![PixelPoint::new(0, 0), PixelPoint::new(4, 4)]);
        let err = builder(1.0).build(&region, 0).unwrap_err();
        assert!(matches!(err, ComponentError::DegenerateBoundary { vertices: 2 }));
    }

    #[test]
    fn weighted_centre_of_mass_wins_over_centroid() {
        let mut region = rect_region(0, 0, 4, 4);
        region.stats.add(Measurement::CentreOfMassX, 1.0);
        region.stats.add(Measurement::CentreOfMassY, 3.0);
        let c = builder(1.0).build(&region, 0).unwrap();
        assert_eq!(c.centre_of_mass(), Point::new(1.0, 3.0));
    }

    #[test]
    fn scaled_measurements() {
        let c = builder(2.0).build(&rect_region(0, 0, 4, 4), 0).unwrap();
        assert!((c.scaled_measurement(Measurement::Area).unwrap() - 4.0).abs() < 1e-12);
        assert!((c.scaled_measurement(Measurement::Perimeter).unwrap() - 8.0).abs() < 1e-12);
        assert!((c.scaled_measurement(Measurement::Circularity).unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn non_positive_scale_is_rejected() {
        let err = builder(0.0).build(&rect_region(0, 0, 4, 4), 0).unwrap_err();
        assert!(matches!(err, ComponentError::Rejected(_)));
    }

    #[test]
    fn orientation_follows_long_axis() {
        let wide = builder(1.0).build(&rect_region(0, 0, 10, 2), 0).unwrap();
        assert!(wide.orientation().abs() < 1e-9, "got {}", wide.orientation());
        let tall = builder(1.0).build(&rect_region(0, 0, 2, 10), 0).unwrap();
        assert!(
            (tall.orientation().abs() - std::f64::consts::FRAC_PI_2).abs() < 1e-9,
            "got {}",
            tall.orientation()
        );
    }

    #[test]
    fn vertical_mask_stands_wide_shapes_upright() {
        let wide = builder(1.0).build(&rect_region(20, 20, 10, 2), 0).unwrap();
        let mask = wide.vertical_mask(15, 15);
        // Rotated, the 10x2 bar spans rows but not columns.
        let column: u64 = (0..15).map(|y| u64::from(mask.is_set(7, y))).sum();
        let row: u64 = (0..15).map(|x| u64::from(mask.is_set(x, 7))).sum();
        assert!(column > row, "column {column} should exceed row {row}");
        assert!(mask.is_set(7, 7), "centre cell should be inside");
    }

    #[test]
    fn moving_shifts_the_mask() {
        let mut c = builder(1.0).build(&rect_region(0, 0, 5, 3), 0).unwrap();
        let before = c.vertical_mask(21, 21);
        c.move_centre_of_mass(3.0, -2.0);
        assert_eq!(c.offset(), Point::new(3.0, -2.0));
        let after = c.vertical_mask(21, 21);
        assert_eq!(after, before.offset(3, -2));
    }

    #[test]
    fn alignment_moves_the_reported_centre_of_mass() {
        use crate::align::MaskAligner;

        let mut c = builder(1.0).build(&rect_region(0, 0, 10, 4), 0).unwrap();
        assert_eq!(c.aligned_centre_of_mass(), Point::new(5.0, 2.0));
        let reference = c.vertical_mask(41, 41).offset(3, 2);
        let shift = MaskAligner::new(reference, 5).unwrap().align_one(&mut c);
        assert_eq!((shift.dx, shift.dy), (3, 2));
        assert_eq!(c.offset(), Point::new(3.0, 2.0));

        // The vertical frame is the source frame turned a quarter turn,
        // so (3, 2) there is (2, -3) in the image.
        let moved = c.aligned_centre_of_mass();
        assert!(
            (moved.x - 7.0).abs() < 1e-9 && (moved.y + 1.0).abs() < 1e-9,
            "got {moved:?}"
        );
        assert_eq!(c.centre_of_mass(), Point::new(5.0, 2.0));
    }
}
