//! Integration tests: synthetic images through the full detection pipeline.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::f64::consts::PI;

use image::{GrayImage, Luma};
use karyon_pipeline::{
    CancellationToken, ComponentBuilder, ComponentKind, DetectedRegion, Detected,
    DetectionOptions, DetectionPipeline, FilterOptions, ImageSource, Measurement, PixelBuffer,
    Rect,
};

/// Bright disks on a dark background.
fn disks(width: u32, height: u32, spots: &[(i64, i64, i64)]) -> PixelBuffer {
    GrayImage::from_fn(width, height, |x, y| {
        let inside = spots.iter().any(|&(cx, cy, r)| {
            let (dx, dy) = (i64::from(x) - cx, i64::from(y) - cy);
            dx * dx + dy * dy <= r * r
        });
        Luma([if inside { 220 } else { 20 }])
    })
    .into()
}

fn scenario_options() -> DetectionOptions {
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

fn run(options: DetectionOptions, buffer: &PixelBuffer) -> Detected<DetectedRegion> {
    DetectionPipeline::new(options)
        .unwrap()
        .run(buffer, |region, _| Ok(region.clone()), &CancellationToken::new())
        .unwrap()
}

#[test]
fn single_disk_is_found_and_measured() {
    let detected = run(scenario_options(), &disks(50, 50, &[(25, 25, 10)]));
    assert_eq!(detected.components.len(), 1, "expected exactly one boundary");

    let stats = &detected.components[0].stats;
    let area = stats.get(Measurement::Area).unwrap();
    let expected = PI * 100.0;
    assert!(
        (area - expected).abs() / expected < 0.05,
        "expected area within 5% of {expected:.1}, got {area}"
    );
    let circularity = stats.get(Measurement::Circularity).unwrap();
    assert!(circularity > 0.85, "expected circularity > 0.85, got {circularity}");
    let feret = stats.get(Measurement::Feret).unwrap();
    assert!((20.0..=23.0).contains(&feret), "expected feret near 21, got {feret}");
}

#[test]
fn raising_min_size_removes_the_disk() {
    let options = DetectionOptions {
        min_size: 1000,
        ..scenario_options()
    };
    let detected = run(options, &disks(50, 50, &[(25, 25, 10)]));
    assert!(detected.components.is_empty());
    assert_eq!(detected.diagnostics.summary.accepted_regions, 0);
}

#[test]
fn border_touching_disks_follow_edge_exclusion() {
    let buffer = disks(50, 50, &[(6, 25, 6), (43, 25, 6)]);

    let excluded = run(scenario_options(), &buffer);
    assert!(excluded.components.is_empty(), "edge objects should be rejected");

    let kept = run(
        DetectionOptions {
            exclude_edges: false,
            ..scenario_options()
        },
        &buffer,
    );
    assert_eq!(kept.components.len(), 2);
}

#[test]
fn border_padding_keeps_edge_objects_excluded() {
    let buffer = disks(50, 50, &[(6, 25, 6), (25, 25, 8)]);
    let pipeline = DetectionPipeline::new(scenario_options()).unwrap().with_border(3);
    let detected = pipeline
        .run(&buffer, |region, _| Ok(region.clone()), &CancellationToken::new())
        .unwrap();
    assert_eq!(detected.components.len(), 1);
    let bounds = detected.components[0].roi.bounds();
    assert_eq!(bounds, Rect::new(17, 17, 17, 17));
}

#[test]
fn empty_image_yields_empty_result() {
    let detected = run(scenario_options(), &disks(40, 40, &[]));
    assert!(detected.components.is_empty());
    assert!(detected.failures.is_empty());
}

#[test]
fn accepted_regions_respect_every_filter() {
    // Disks of mixed sizes, one against the left edge.
    let buffer = disks(
        120,
        90,
        &[(15, 15, 4), (40, 20, 9), (80, 30, 14), (5, 60, 7), (60, 70, 6), (100, 75, 12)],
    );
    let options = DetectionOptions {
        min_size: 100,
        max_size: Some(500),
        min_circularity: 0.6,
        max_circularity: 1.0,
        ..scenario_options()
    };
    let detected = run(options.clone(), &buffer);
    assert!(!detected.components.is_empty());

    let image = Rect::new(0, 0, 120, 90);
    for region in &detected.components {
        let area = region.stats.get(Measurement::Area).unwrap();
        let circularity = region.stats.get(Measurement::Circularity).unwrap();
        assert!((100.0..=500.0).contains(&area), "area {area} out of range");
        assert!(
            (options.min_circularity..=options.max_circularity).contains(&circularity),
            "circularity {circularity} out of range"
        );
        assert!(
            !region.roi.bounds().touches_edge_of(&image),
            "bounds {:?} touch the image edge",
            region.roi.bounds()
        );
    }
}

#[test]
fn components_carry_scale_and_source() {
    let buffer = disks(50, 50, &[(25, 25, 10)]);
    let builder = ComponentBuilder::new(ComponentKind::Nucleus, ImageSource::new("s.tif", 2), 2.0);
    let detected = DetectionPipeline::new(scenario_options())
        .unwrap()
        .run(&buffer, |r, i| builder.build(r, i), &CancellationToken::new())
        .unwrap();
    assert_eq!(detected.components.len(), 1);
    let nucleus = &detected.components[0];
    let raw = nucleus.measurement(Measurement::Area).unwrap();
    let scaled = nucleus.scaled_measurement(Measurement::Area).unwrap();
    assert!((raw / 4.0 - scaled).abs() < 1e-9);
    let com = nucleus.centre_of_mass();
    assert!((com.x - 25.5).abs() < 1e-9 && (com.y - 25.5).abs() < 1e-9, "got {com:?}");
}

#[test]
fn diagnostics_serialize_to_json() {
    let detected = run(scenario_options(), &disks(50, 50, &[(25, 25, 10)]));
    let json = serde_json::to_string(&detected.diagnostics).unwrap();
    assert!(json.contains("\"accepted\":1"), "unexpected JSON: {json}");
    let report = detected.diagnostics.report();
    assert!(report.contains("Detection"));
}
