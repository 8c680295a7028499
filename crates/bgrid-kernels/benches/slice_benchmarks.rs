//! Criterion benchmarks for slice kernel regression detection

use bgrid_common::{SliceConfig, SliceGeometry};
use bgrid_kernels::{ParallelKernel, ReferenceKernel, SliceKernel};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

/// HDRNet-like shapes: 16×16 spatial grid, 8 depth bins, 12 coefficients.
fn bench_case(side: usize) -> (SliceGeometry, Vec<f32>, Vec<f32>) {
    let config = SliceConfig { coefficient_len: 12, depth: Some(8), ..SliceConfig::default() };
    let geom = SliceGeometry::from_shapes(&[1, side, side], &[1, 96, 16, 16], &config)
        .expect("bench shapes are consistent");
    let guide = (0..geom.guide_len()).map(|i| (i % 256) as f32 / 255.0).collect();
    let grid = (0..geom.grid_len()).map(|i| ((i % 97) as f32 / 97.0) - 0.5).collect();
    (geom, guide, grid)
}

fn providers() -> Vec<Box<dyn SliceKernel>> {
    vec![Box::new(ReferenceKernel), Box::new(ParallelKernel::new())]
}

fn bench_forward(c: &mut Criterion) {
    let mut group = c.benchmark_group("slice_forward");

    for side in [128, 256, 512] {
        let (geom, guide, grid) = bench_case(side);
        let mut output = vec![0.0f32; geom.output_len()];
        group.throughput(Throughput::Elements(geom.output_len() as u64));

        for kernel in providers() {
            group.bench_with_input(BenchmarkId::new(kernel.name(), side), &side, |b, _| {
                b.iter(|| {
                    kernel
                        .forward(&geom, black_box(&guide), black_box(&grid), black_box(&mut output))
                        .unwrap()
                })
            });
        }
    }

    group.finish();
}

fn bench_backward(c: &mut Criterion) {
    let mut group = c.benchmark_group("slice_backward");

    for side in [128, 256] {
        let (geom, guide, grid) = bench_case(side);
        let d_out = vec![1.0f32; geom.output_len()];
        let mut dg = vec![0.0f32; geom.guide_len()];
        let mut dgrid = vec![0.0f32; geom.grid_len()];
        group.throughput(Throughput::Elements(geom.output_len() as u64));

        for kernel in providers() {
            group.bench_with_input(BenchmarkId::new(kernel.name(), side), &side, |b, _| {
                b.iter(|| {
                    kernel
                        .backward(
                            &geom,
                            black_box(&guide),
                            black_box(&grid),
                            black_box(&d_out),
                            Some(&mut dg),
                            Some(&mut dgrid),
                        )
                        .unwrap()
                })
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_forward, bench_backward);
criterion_main!(benches);
