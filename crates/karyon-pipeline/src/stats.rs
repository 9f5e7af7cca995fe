//! Named per-object measurements.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::StatsError;

/// A measurement recorded for a detected object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Measurement {
    /// Pixel count of the region.
    Area,
    /// Traced perimeter length in pixels.
    Perimeter,
    /// `4π·area/perimeter²`, clamped to `[0, 1]`.
    Circularity,
    /// Maximum caliper diameter in pixels.
    Feret,
    /// Unweighted mean pixel-centre column.
    CentroidX,
    /// Unweighted mean pixel-centre row.
    CentroidY,
    /// Intensity-weighted mean pixel-centre column.
    CentreOfMassX,
    /// Intensity-weighted mean pixel-centre row.
    CentreOfMassY,
}

impl Measurement {
    /// Whether the value is a length or area that scales with the
    /// image calibration.
    #[must_use]
    pub const fn is_dimensional(self) -> bool {
        !matches!(self, Self::Circularity)
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The measurements recorded for one object.
///
/// Reading a measurement that was never added is an error rather than
/// a silent zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsMap(BTreeMap<Measurement, f64>);

impl StatsMap {
    /// Create an empty bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `value` for `measurement`, replacing any earlier value.
    pub fn add(&mut self, measurement: Measurement, value: f64) {
        self.0.insert(measurement, value);
    }

    /// Read a measurement.
    ///
    /// # Errors
    ///
    /// Returns [`StatsError::Missing`] if `measurement` was never added.
    pub fn get(&self, measurement: Measurement) -> Result<f64, StatsError> {
        self.0
            .get(&measurement)
            .copied()
            .ok_or(StatsError::Missing(measurement))
    }

    /// Whether `measurement` has been recorded.
    #[must_use]
    pub fn contains(&self, measurement: Measurement) -> bool {
        self.0.contains_key(&measurement)
    }

    /// Number of recorded measurements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Recorded measurements in [`Measurement`] order.
    pub fn iter(&self) -> impl Iterator<Item = (Measurement, f64)> + '_ {
        self.0.iter().map(|(&m, &v)| (m, v))
    }
}

impl FromIterator<(Measurement, f64)> for StatsMap {
    fn from_iter<I: IntoIterator<Item = (Measurement, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
