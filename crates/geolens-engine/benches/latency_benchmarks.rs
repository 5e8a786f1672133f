//! Latency benchmarks for the heuristic path
//!
//! Covers feature sampling, rule classification, and a full `identify`
//! call that has no model to load.
//!
//! Run with: cargo bench -p geolens-engine

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use tokio::runtime::Runtime;

use geolens_engine::{analyze, BackendPreference, Engine, EngineConfig, HeuristicClassifier, Jitter};

fn scene(width: u32, height: u32) -> DynamicImage {
    let mut img = RgbImage::new(width, height);
    for (x, y, p) in img.enumerate_pixels_mut() {
        *p = if y < height / 3 {
            Rgb([120, 160, 220])
        } else {
            Rgb([140 + (x % 40) as u8, 95, 60])
        };
    }
    DynamicImage::ImageRgb8(img)
}

/// Feature sampling cost grows with the source size (resize dominates)
fn benchmark_feature_sampler(c: &mut Criterion) {
    let mut group = c.benchmark_group("Feature_Sampler");
    group.sample_size(50);

    for (w, h) in [(320, 240), (1280, 960), (4032, 3024)] {
        let img = scene(w, h);
        group.bench_with_input(
            BenchmarkId::new("analyze", format!("{}x{}", w, h)),
            &img,
            |b, img| b.iter(|| analyze(black_box(img))),
        );
    }

    group.finish();
}

fn benchmark_heuristic_classifier(c: &mut Criterion) {
    let classifier = HeuristicClassifier::new(Jitter::seeded(7));
    let features = analyze(&scene(640, 480));

    c.bench_function("heuristic_classify", |b| {
        b.iter(|| classifier.classify(black_box(&features)))
    });
}

fn benchmark_identify_without_model(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut config = EngineConfig::default()
        .with_model("/nonexistent/model.json")
        .with_seed(7)
        .with_backend(BackendPreference::Cpu);
    config.model.secondary = None;
    let engine = Engine::new(config);

    let mut encoded = Cursor::new(Vec::new());
    scene(1024, 768)
        .write_to(&mut encoded, ImageFormat::Png)
        .unwrap();
    let encoded = encoded.into_inner();

    rt.block_on(engine.load_model());

    c.bench_function("identify_heuristic_png_1024x768", |b| {
        b.iter(|| {
            rt.block_on(async {
                engine
                    .identify(black_box(encoded.clone()))
                    .await
                    .unwrap()
            })
        })
    });
}

criterion_group!(
    benches,
    benchmark_feature_sampler,
    benchmark_heuristic_classifier,
    benchmark_identify_without_model,
);
criterion_main!(benches);
