use criterion::{black_box, criterion_group, criterion_main, Criterion};

use pcd_core::{features::FeatureMatrix, Position};
use pcd_interpolator::{interpolate_features, interpolate_labels};

fn grid(step: f64, n: usize, jitter: f64) -> Vec<Position> {
    let mut points = Vec::with_capacity(n * n * 4);
    for i in 0..n {
        for j in 0..n {
            for k in 0..4 {
                let x = i as f64 * step + jitter * k as f64;
                let y = j as f64 * step + jitter * (k % 2) as f64;
                points.push([x, y, k as f64 * 0.5]);
            }
        }
    }
    points
}

fn bench_interpolation(c: &mut Criterion) {
    let source = grid(1.0, 100, 0.13);
    let target = grid(0.5, 200, 0.07);
    let num_classes = 6;
    let data: Vec<f32> = (0..source.len() * num_classes)
        .map(|i| (i % 17) as f32 * 0.25)
        .collect();
    let logits = FeatureMatrix::from_flat(num_classes, data).unwrap();
    let labels: Vec<u32> = (0..source.len()).map(|i| (i % num_classes) as u32).collect();

    c.bench_function("interpolate_features k=1", |b| {
        b.iter(|| interpolate_features(black_box(&source), &logits, black_box(&target), 1))
    });
    c.bench_function("interpolate_features k=3", |b| {
        b.iter(|| interpolate_features(black_box(&source), &logits, black_box(&target), 3))
    });
    c.bench_function("interpolate_labels", |b| {
        b.iter(|| interpolate_labels(black_box(&source), &labels, black_box(&target)))
    });
}

criterion_group!(benches, bench_interpolation);
criterion_main!(benches);
