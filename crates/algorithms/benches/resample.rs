//! Benchmarks for the engine's grid operations

use std::collections::BTreeMap;

use ancil_algorithms::engine::{reclassify_weights, resample, Engine, ResampleMethod};
use ancil_core::{Extent, Raster, Region};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn grid(size: usize) -> Region {
    Region::with_resolution(Extent::new(0.0, 0.0, 1.0, 1.0).unwrap(), 1.0 / size as f64).unwrap()
}

fn create_classes(size: usize) -> Raster<f64> {
    let data = (0..size * size).map(|i| [10.0, 30.0, 130.0, 210.0][(i * 7 + i / size) % 4]).collect();
    Raster::from_vec(grid(size), data).unwrap()
}

fn bench_resample(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine/resample_average");
    for size in [256, 512, 1024, 2048] {
        let src = create_classes(size);
        let target = grid(size / 8 + 1);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| resample(black_box(&src), black_box(&target), ResampleMethod::Average).unwrap())
        });
    }
    group.finish();
}

fn bench_reclassify(c: &mut Criterion) {
    let table: BTreeMap<i64, f64> = [(10, 0.6), (30, 0.25), (130, 1.0)].into_iter().collect();
    let mut group = c.benchmark_group("engine/reclassify_weights");
    for size in [256, 512, 1024, 2048] {
        let src = create_classes(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| reclassify_weights(black_box(&src), black_box(&table)).unwrap())
        });
    }
    group.finish();
}

fn bench_map_algebra(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine/map_algebra");
    for size in [256, 512, 1024] {
        let mut engine = Engine::default();
        engine.insert("lc", create_classes(size)).unwrap();
        let region = grid(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                engine
                    .map_algebra(&region, "water", black_box("if(lc == 210, 1, 0)"), None)
                    .unwrap()
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_resample, bench_reclassify, bench_map_algebra);
criterion_main!(benches);
