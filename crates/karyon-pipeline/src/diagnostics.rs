//! Pipeline diagnostics: timing, counts, and other metrics for each stage.
//!
//! Every [`DetectionPipeline::run`](crate::DetectionPipeline::run)
//! collects diagnostics alongside its components, for threshold tuning
//! and for explaining why an image produced no objects.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::detector::DetectionCounts;

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Diagnostics collected from a single pipeline run.
///
/// Optional filter steps have `Option` fields that are `None` when the
/// step was disabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    /// Conversion to 8-bit greyscale.
    pub greyscale: StageDiagnostics,
    /// Border padding and inversion.
    pub border: Option<StageDiagnostics>,
    /// Kuwahara smoothing.
    pub smoothing: Option<StageDiagnostics>,
    /// Bright-region flattening.
    pub flattening: Option<StageDiagnostics>,
    /// Gaussian blur and Canny.
    pub edge_detection: Option<StageDiagnostics>,
    /// Dilate, fill, erode.
    pub gap_closing: Option<StageDiagnostics>,
    /// Polarity restore and binarization.
    pub threshold: StageDiagnostics,
    /// Boundary tracing and filtering.
    pub detection: StageDiagnostics,
    /// Measurement attachment and component construction.
    pub construction: StageDiagnostics,
    /// Total wall-clock duration of the entire pipeline (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary counts across all stages.
    pub summary: PipelineSummary,
}

/// Diagnostics for a single pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics (counts, sizes, etc.).
    pub metrics: StageMetrics,
}

/// Stage-specific metrics that vary by pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Greyscale conversion metrics.
    Greyscale {
        /// Image width in pixels.
        width: u32,
        /// Image height in pixels.
        height: u32,
        /// Bit depth of the source buffer.
        bit_depth: u8,
    },
    /// Border padding metrics.
    Border {
        /// Padding per side in pixels.
        width: u32,
        /// Padded image width.
        padded_width: u32,
        /// Padded image height.
        padded_height: u32,
    },
    /// Kuwahara smoothing metrics.
    Smoothing {
        /// Window size used.
        kernel: u32,
    },
    /// Flattening metrics.
    Flattening {
        /// Brightness ceiling.
        ceiling: u8,
        /// Number of pixels clamped.
        clamped_pixel_count: u64,
    },
    /// Canny edge detection metrics.
    EdgeDetection {
        /// Gaussian sigma applied first.
        sigma: f32,
        /// Low threshold (after clamping).
        low_threshold: f32,
        /// High threshold (after clamping).
        high_threshold: f32,
        /// Number of edge pixels (value == 255) in the output.
        edge_pixel_count: u64,
        /// Total pixel count for computing edge density.
        total_pixel_count: u64,
    },
    /// Gap closing metrics.
    GapClosing {
        /// Disk radius.
        radius: u8,
        /// Foreground pixels after closing.
        foreground_pixel_count: u64,
    },
    /// Binarization metrics.
    Threshold {
        /// Threshold value; pixels above it are foreground.
        threshold: u8,
        /// Foreground pixels after binarization.
        foreground_pixel_count: u64,
        /// Total pixel count.
        total_pixel_count: u64,
    },
    /// Detection metrics.
    Detection(DetectionCounts),
    /// Component construction metrics.
    Construction {
        /// Components built.
        created: usize,
        /// Regions the factory rejected.
        skipped: usize,
    },
}

/// High-level summary counts for the entire pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Source image width in pixels.
    pub image_width: u32,
    /// Source image height in pixels.
    pub image_height: u32,
    /// Total pixel count.
    pub pixel_count: u64,
    /// Regions that passed every filter.
    pub accepted_regions: usize,
    /// Components returned to the caller.
    pub component_count: usize,
}

impl PipelineDiagnostics {
    /// Stages that ran, in pipeline order, with display names.
    #[must_use]
    pub fn stages(&self) -> Vec<(&'static str, &StageDiagnostics)> {
        let mut stages = vec![("Greyscale", &self.greyscale)];
        for (name, stage) in [
            ("Border", &self.border),
            ("Smoothing", &self.smoothing),
            ("Flattening", &self.flattening),
            ("Edge Detection", &self.edge_detection),
            ("Gap Closing", &self.gap_closing),
        ] {
            if let Some(stage) = stage {
                stages.push((name, stage));
            }
        }
        stages.push(("Threshold", &self.threshold));
        stages.push(("Detection", &self.detection));
        stages.push(("Construction", &self.construction));
        stages
    }

    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Detection Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Image: {}x{} ({} pixels)",
            self.summary.image_width, self.summary.image_height, self.summary.pixel_count,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        for (name, diag) in self.stages() {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<24} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.push(String::new());
        lines.push(format!(
            "Accepted regions: {}  |  Components: {}",
            self.summary.accepted_regions, self.summary.component_count,
        ));

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

#[allow(clippy::cast_precision_loss)]
fn percent(part: u64, whole: u64) -> f64 {
    if whole > 0 {
        part as f64 / whole as f64 * 100.0
    } else {
        0.0
    }
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Greyscale {
            width,
            height,
            bit_depth,
        } => format!("{width}x{height} from {bit_depth}-bit"),
        StageMetrics::Border {
            width,
            padded_width,
            padded_height,
        } => format!("+{width}px -> {padded_width}x{padded_height}, inverted"),
        StageMetrics::Smoothing { kernel } => format!("kuwahara kernel={kernel}"),
        StageMetrics::Flattening {
            ceiling,
            clamped_pixel_count,
        } => format!("ceiling={ceiling} clamped={clamped_pixel_count}"),
        StageMetrics::EdgeDetection {
            sigma,
            low_threshold,
            high_threshold,
            edge_pixel_count,
            total_pixel_count,
        } => {
            let density = percent(*edge_pixel_count, *total_pixel_count);
            format!(
                "sigma={sigma:.2} low={low_threshold:.1} high={high_threshold:.1} edges={edge_pixel_count} ({density:.1}%)",
            )
        }
        StageMetrics::GapClosing {
            radius,
            foreground_pixel_count,
        } => format!("radius={radius} foreground={foreground_pixel_count}"),
        StageMetrics::Threshold {
            threshold,
            foreground_pixel_count,
            total_pixel_count,
        } => {
            let coverage = percent(*foreground_pixel_count, *total_pixel_count);
            format!("t={threshold} foreground={foreground_pixel_count} ({coverage:.1}%)")
        }
        StageMetrics::Detection(counts) => format!(
            "{} candidates: {} accepted, rejected edge={} size={} circularity={}",
            counts.candidates,
            counts.accepted,
            counts.rejected_edge,
            counts.rejected_size,
            counts.rejected_circularity,
        ),
        StageMetrics::Construction { created, skipped } => {
            format!("{created} created, {skipped} skipped")
        }
    }
}
