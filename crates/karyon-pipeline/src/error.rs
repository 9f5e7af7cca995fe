//! Error types for detection, component construction, masks, and
//! alignment.

use crate::stats::Measurement;

/// Errors that abort a whole detection call.
#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    /// Detection options violate an invariant (for example a minimum
    /// size that is not below the maximum size).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The pixel buffer has a layout the detector cannot read.
    #[error("unsupported pixel buffer: {0}")]
    UnsupportedBuffer(String),

    /// The run was cancelled through its [`CancellationToken`](crate::CancellationToken).
    #[error("detection cancelled")]
    Cancelled,

    /// A mask operation failed while rasterizing a region.
    #[error(transparent)]
    Mask(#[from] MaskError),
}

/// Errors building a domain object from one detected region.
///
/// These are recovered per region: the pipeline logs and skips the
/// region and keeps going.
#[derive(Debug, thiserror::Error)]
pub enum ComponentError {
    /// A measurement the component requires was not recorded.
    #[error(transparent)]
    MissingMeasurement(#[from] StatsError),

    /// The boundary has too few vertices to enclose any area.
    #[error("degenerate boundary with {vertices} vertices")]
    DegenerateBoundary {
        /// Number of vertices in the rejected boundary.
        vertices: usize,
    },

    /// The factory declined the region for a domain-specific reason.
    #[error("component rejected: {0}")]
    Rejected(String),
}

/// Errors from bounds-checked [`BooleanMask`](crate::BooleanMask) access.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MaskError {
    /// The coordinate lies outside the mask grid.
    #[error("cell ({x}, {y}) is outside a {width}x{height} mask")]
    OutOfBounds {
        /// Requested column.
        x: i64,
        /// Requested row.
        y: i64,
        /// Mask width.
        width: u32,
        /// Mask height.
        height: u32,
    },
}

/// Errors reading a [`StatsMap`](crate::StatsMap).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StatsError {
    /// The measurement was never added.
    #[error("measurement {0} has not been recorded")]
    Missing(Measurement),
}

/// Errors from the parallel aligner.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AlignError {
    /// The run was cancelled before every item was aligned.
    #[error("alignment cancelled")]
    Cancelled,

    /// The reference mask has no cells to align against.
    #[error("reference mask is {width}x{height}; it must be non-empty")]
    ReferenceSize {
        /// Reference width.
        width: u32,
        /// Reference height.
        height: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_config_display() {
        let err = DetectionError::InvalidConfig("min_size 10 must be below max_size 5".to_owned());
        assert_eq!(
            err.to_string(),
            "invalid configuration: min_size 10 must be below max_size 5"
        );
    }

    #[test]
    fn mask_error_converts_into_detection_error() {
        let err: DetectionError = MaskError::OutOfBounds {
            x: 9,
            y: -1,
            width: 4,
            height: 4,
        }
        .into();
        assert_eq!(err.to_string(), "cell (9, -1) is outside a 4x4 mask");
    }

    #[test]
    fn missing_measurement_display() {
        let err: ComponentError = StatsError::Missing(Measurement::Feret).into();
        assert_eq!(err.to_string(), "measurement Feret has not been recorded");
    }
}
