//! karyon-bench: CLI tool for detection parameter experimentation and
//! diagnostics.
//!
//! Runs the detection pipeline on a given image file with configurable
//! parameters, printing per-stage diagnostics and the detected objects.
//! Useful for:
//!
//! - Tuning the threshold, size, and circularity filters for a stain
//! - Checking which preprocessing steps a set of images needs
//! - Measuring per-stage durations to identify bottlenecks
//! - Trying the alignment pass on the detected nuclei
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin karyon-bench -- [OPTIONS] <IMAGE_PATH>
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use karyon_pipeline::diagnostics::PipelineDiagnostics;
use karyon_pipeline::options::{
    DEFAULT_CANNY_HIGH, DEFAULT_CANNY_KERNEL_RADIUS, DEFAULT_CANNY_LOW, DEFAULT_CLOSING_RADIUS,
    DEFAULT_FLATTEN_THRESHOLD, DEFAULT_MAX_CIRCULARITY, DEFAULT_MAX_SIZE, DEFAULT_MIN_CIRCULARITY,
    DEFAULT_MIN_SIZE, DEFAULT_SMOOTHING_KERNEL, DEFAULT_THRESHOLD,
};
use karyon_pipeline::{
    CancellationToken, CellularComponent, ComponentKind, Connectivity, DetectionOptions,
    FilterOptions, ImageSource, MaskAligner, Measurement,
};
use tracing_subscriber::EnvFilter;

/// Detection parameter experimentation and diagnostics for karyon.
///
/// Runs the detection pipeline on a given image with configurable
/// parameters and prints per-stage timing, filter counts, and the
/// measurements of every detected object.
#[derive(Parser)]
#[command(name = "karyon-bench", version)]
struct Cli {
    /// Path to the input image (PNG, JPEG, BMP, TIFF).
    image_path: PathBuf,

    /// Colour channel to analyse (0 = red, 1 = green, 2 = blue).
    #[arg(long, default_value_t = 2)]
    channel: u32,

    /// Binarization threshold; brighter pixels are foreground.
    #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
    threshold: u8,

    /// Smallest object in pixels.
    #[arg(long, default_value_t = DEFAULT_MIN_SIZE)]
    min_size: u64,

    /// Largest object in pixels. 0 means the image area.
    #[arg(long, default_value_t = DEFAULT_MAX_SIZE)]
    max_size: u64,

    /// Lowest circularity.
    #[arg(long, default_value_t = DEFAULT_MIN_CIRCULARITY)]
    min_circularity: f64,

    /// Highest circularity.
    #[arg(long, default_value_t = DEFAULT_MAX_CIRCULARITY)]
    max_circularity: f64,

    /// Pixels per micron.
    #[arg(long, default_value_t = 1.0)]
    scale: f64,

    /// Keep objects touching the image edge.
    #[arg(long)]
    keep_edge_objects: bool,

    /// Exclude enclosed holes from object area.
    #[arg(long)]
    exclude_holes: bool,

    /// Pixel connectivity.
    #[arg(long, value_enum, default_value_t = Neighbours::Eight)]
    connectivity: Neighbours,

    /// Pad the image with a background border of this width (0 = off).
    #[arg(long, default_value_t = 0)]
    border: u32,

    /// Disable Kuwahara smoothing.
    #[arg(long)]
    no_smoothing: bool,

    /// Kuwahara kernel size.
    #[arg(long, default_value_t = DEFAULT_SMOOTHING_KERNEL)]
    smoothing_kernel: u32,

    /// Disable bright-region flattening.
    #[arg(long)]
    no_flattening: bool,

    /// Flattening ceiling.
    #[arg(long, default_value_t = DEFAULT_FLATTEN_THRESHOLD)]
    flatten_threshold: u8,

    /// Disable Canny edge detection.
    #[arg(long)]
    no_edge_detection: bool,

    /// Canny low threshold.
    #[arg(long, default_value_t = DEFAULT_CANNY_LOW)]
    canny_low: f32,

    /// Canny high threshold.
    #[arg(long, default_value_t = DEFAULT_CANNY_HIGH)]
    canny_high: f32,

    /// Gaussian sigma applied before Canny.
    #[arg(long, default_value_t = DEFAULT_CANNY_KERNEL_RADIUS)]
    canny_kernel_radius: f32,

    /// Disable morphological gap closing.
    #[arg(long)]
    no_gap_closing: bool,

    /// Gap closing disk radius.
    #[arg(long, default_value_t = DEFAULT_CLOSING_RADIUS)]
    closing_radius: u8,

    /// Retry with relaxed filters when nothing is found.
    #[arg(long)]
    relaxed_retry: bool,

    /// Align detected nuclei on a square canvas of this size, using the
    /// largest nucleus as the reference.
    #[arg(long)]
    align: Option<u32>,

    /// Largest shift the aligner tries on each axis.
    #[arg(long, default_value_t = 10)]
    max_shift: u32,

    /// Number of runs for averaging.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Output diagnostics as JSON instead of human-readable report.
    #[arg(long)]
    json: bool,

    /// Full detection options as a JSON string.
    ///
    /// When provided, all other detection parameter flags are ignored.
    /// The JSON must be a valid `DetectionOptions` serialization.
    #[arg(long, conflicts_with = "config")]
    config_json: Option<String>,

    /// Full detection options read from a JSON file.
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Pixel connectivity selection.
#[derive(Clone, Copy, ValueEnum)]
enum Neighbours {
    /// Diagonal neighbours join regions.
    Eight,
    /// Only edge-sharing neighbours join regions.
    Four,
}

/// Build [`DetectionOptions`] from CLI arguments.
///
/// If `--config-json` or `--config` is provided, the JSON is parsed
/// directly and all individual parameter flags are ignored. Otherwise,
/// options are assembled from the individual flags.
fn options_from_cli(cli: &Cli) -> Result<DetectionOptions, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }
    if let Some(ref path) = cli.config {
        let json = std::fs::read_to_string(path)
            .map_err(|e| format!("Error reading {}: {e}", path.display()))?;
        return serde_json::from_str(&json)
            .map_err(|e| format!("Error parsing {}: {e}", path.display()));
    }

    Ok(DetectionOptions {
        threshold: cli.threshold,
        min_size: cli.min_size,
        max_size: (cli.max_size > 0).then_some(cli.max_size),
        min_circularity: cli.min_circularity,
        max_circularity: cli.max_circularity,
        channel: cli.channel,
        include_holes: !cli.exclude_holes,
        exclude_edges: !cli.keep_edge_objects,
        connectivity: match cli.connectivity {
            Neighbours::Eight => Connectivity::Eight,
            Neighbours::Four => Connectivity::Four,
        },
        scale: cli.scale,
        filter: FilterOptions {
            add_border: cli.border > 0,
            border_width: cli.border,
            use_smoothing: !cli.no_smoothing,
            smoothing_kernel: cli.smoothing_kernel,
            use_flattening: !cli.no_flattening,
            flatten_threshold: cli.flatten_threshold,
            use_edge_detection: !cli.no_edge_detection,
            canny_low: cli.canny_low,
            canny_high: cli.canny_high,
            canny_kernel_radius: cli.canny_kernel_radius,
            use_gap_closing: !cli.no_gap_closing,
            closing_radius: cli.closing_radius,
        },
    })
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let options = match options_from_cli(&cli) {
        Ok(o) => o,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let image = match image::open(&cli.image_path) {
        Ok(image) => image,
        Err(e) => {
            eprintln!("Error reading {}: {e}", cli.image_path.display());
            return ExitCode::FAILURE;
        }
    };

    eprintln!(
        "Image: {} ({}x{})",
        cli.image_path.display(),
        image.width(),
        image.height(),
    );
    eprintln!("Options: {options:#?}");
    eprintln!("Runs: {}", cli.runs);
    eprintln!();

    let cancel = CancellationToken::new();
    let mut all_diagnostics = Vec::with_capacity(cli.runs);
    let mut nuclei = Vec::new();

    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }

        let source = ImageSource::new(&cli.image_path, options.channel);
        match karyon_pipeline::detect(
            &image,
            ComponentKind::Nucleus,
            source,
            &options,
            cli.relaxed_retry,
            &cancel,
        ) {
            Ok(detected) => {
                if cli.json {
                    match serde_json::to_string_pretty(&detected.diagnostics) {
                        Ok(json) => println!("{json}"),
                        Err(e) => {
                            eprintln!("Error serializing diagnostics: {e}");
                            return ExitCode::FAILURE;
                        }
                    }
                } else {
                    println!("{}", detected.diagnostics.report());
                }
                for failure in &detected.failures {
                    eprintln!("Skipped region {}: {}", failure.index, failure.error);
                }

                // Keep the components from the first run only.
                if run == 0 {
                    nuclei = detected.components;
                }
                all_diagnostics.push(detected.diagnostics);
            }
            Err(e) => {
                eprintln!("Pipeline error: {e}");
                return ExitCode::FAILURE;
            }
        }

        if cli.runs > 1 {
            eprintln!();
        }
    }

    if !cli.json {
        print_components(&nuclei);
    }

    if let Some(canvas) = cli.align {
        match align(&mut nuclei, canvas, cli.max_shift, &cancel) {
            Ok(()) => {
                if !cli.json {
                    print_offsets(&nuclei);
                }
            }
            Err(msg) => {
                eprintln!("{msg}");
                return ExitCode::FAILURE;
            }
        }
    }

    // Print summary when multiple runs.
    if cli.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }

    ExitCode::SUCCESS
}

/// Align `nuclei` against the vertical mask of the largest one.
fn align(
    nuclei: &mut [CellularComponent],
    canvas: u32,
    max_shift: u32,
    cancel: &CancellationToken,
) -> Result<(), String> {
    let Some(reference) = nuclei.iter().max_by(|a, b| {
        let area = |c: &CellularComponent| c.measurement(Measurement::Area).unwrap_or(0.0);
        area(a).total_cmp(&area(b))
    }) else {
        eprintln!("No nuclei to align");
        return Ok(());
    };
    let aligner = MaskAligner::new(reference.vertical_mask(canvas, canvas), max_shift)
        .map_err(|e| format!("Alignment error: {e}"))?;
    let total = nuclei.len();
    let aligned = aligner
        .align_all(nuclei, cancel, &|done| {
            tracing::debug!(done, total, "aligned");
        })
        .map_err(|e| format!("Alignment error: {e}"))?;
    eprintln!("Aligned {aligned} nuclei on a {canvas}x{canvas} canvas");
    Ok(())
}

/// Print one line of measurements per component.
fn print_components(components: &[CellularComponent]) {
    if components.is_empty() {
        println!("No components detected");
        return;
    }
    println!();
    println!(
        "{:>4} {:>10} {:>10} {:>8} {:>10} {:>18}",
        "#", "Area", "Perimeter", "Circ.", "Feret", "Centre of mass"
    );
    println!("{}", "-".repeat(66));
    for c in components {
        let value = |m| c.scaled_measurement(m).unwrap_or(f64::NAN);
        let com = c.centre_of_mass();
        println!(
            "{:>4} {:>10.2} {:>10.2} {:>8.3} {:>10.2} {:>8.1},{:>8.1}",
            c.number(),
            value(Measurement::Area),
            value(Measurement::Perimeter),
            value(Measurement::Circularity),
            value(Measurement::Feret),
            com.x,
            com.y,
        );
    }
}

/// Print the shift the aligner applied to each component.
fn print_offsets(components: &[CellularComponent]) {
    println!();
    println!("{:>4} {:>8} {:>8} {:>18}", "#", "dx", "dy", "Aligned centre");
    for c in components {
        let offset = c.offset();
        let com = c.aligned_centre_of_mass();
        println!(
            "{:>4} {:>8.0} {:>8.0} {:>8.1},{:>8.1}",
            c.number(),
            offset.x,
            offset.y,
            com.x,
            com.y,
        );
    }
}

/// Function pointer type for extracting a stage duration from diagnostics.
type StageExtractor = fn(&PipelineDiagnostics) -> Option<Duration>;

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[PipelineDiagnostics]) {
    println!();
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    if all_diagnostics.is_empty() {
        println!("Warning: no diagnostics to summarize");
        return;
    }

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total_duration.as_secs_f64() * 1000.0)
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    println!("Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    // Per-stage means.
    println!();
    println!("{:<24} {:>12}", "Stage", "Mean (ms)");
    println!("{}", "-".repeat(40));

    let stage_extractors: &[(&str, StageExtractor)] = &[
        ("Greyscale", |d| Some(d.greyscale.duration)),
        ("Border", |d| d.border.as_ref().map(|s| s.duration)),
        ("Smoothing", |d| d.smoothing.as_ref().map(|s| s.duration)),
        ("Flattening", |d| d.flattening.as_ref().map(|s| s.duration)),
        ("Edge Detection", |d| d.edge_detection.as_ref().map(|s| s.duration)),
        ("Gap Closing", |d| d.gap_closing.as_ref().map(|s| s.duration)),
        ("Threshold", |d| Some(d.threshold.duration)),
        ("Detection", |d| Some(d.detection.duration)),
        ("Construction", |d| Some(d.construction.duration)),
    ];

    for (name, extractor) in stage_extractors {
        let stage_durations: Vec<f64> = all_diagnostics
            .iter()
            .filter_map(extractor)
            .map(|dur| dur.as_secs_f64() * 1000.0)
            .collect();

        if stage_durations.is_empty() {
            continue;
        }

        let stage_mean = stage_durations.iter().sum::<f64>() / stage_durations.len() as f64;
        println!("{name:<24} {stage_mean:>10.3}ms");
    }
}
