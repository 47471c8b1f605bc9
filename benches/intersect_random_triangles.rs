use std::{sync::Arc, time::Duration};

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use qbvh::{
    PrimitiveRef, Qbvh, QbvhSettings, SplitMode, TriangleMesh,
    geometry::{Ray, Triangle, WorldPoint, WorldVector},
};
use rand::{Rng, SeedableRng, rngs::SmallRng};

const TRIANGLE_COUNT: usize = 50_000;
const RAY_COUNT: usize = 10_000;

fn random_point(rng: &mut SmallRng) -> WorldPoint {
    WorldPoint::new(rng.random(), rng.random(), rng.random())
}

/// Soup of small triangles filling the unit cube, a few of them long and thin
fn scene(rng: &mut SmallRng) -> Vec<PrimitiveRef> {
    let mut positions = Vec::with_capacity(3 * TRIANGLE_COUNT);
    for i in 0..TRIANGLE_COUNT {
        let size = if i % 100 == 0 { 0.5 } else { 0.02 };
        let center = random_point(rng);
        for _ in 0..3 {
            let offset = random_point(rng) - WorldPoint::new(0.5, 0.5, 0.5);
            positions.push(center + offset * size);
        }
    }
    let triangles = (0..TRIANGLE_COUNT)
        .map(|i| Triangle::new(3 * i, 3 * i + 1, 3 * i + 2))
        .collect();
    vec![Arc::new(TriangleMesh::new(positions, triangles)) as PrimitiveRef]
}

fn rays(rng: &mut SmallRng) -> Vec<Ray> {
    (0..RAY_COUNT)
        .map(|_| {
            let origin = random_point(rng) * 3.0 - WorldVector::new(1.0, 1.0, 1.0);
            let target = random_point(rng);
            Ray::new(origin, target - origin)
        })
        .collect()
}

fn settings(split_mode: SplitMode) -> QbvhSettings {
    QbvhSettings::builder().split_mode(split_mode).build()
}

fn criterion_benchmark(c: &mut Criterion) {
    let mut rng = SmallRng::seed_from_u64(0);
    let scene = scene(&mut rng);
    let rays = rays(&mut rng);

    let mut group = c.benchmark_group("build");
    for split_mode in [SplitMode::Object, SplitMode::Spatial] {
        group.bench_with_input(
            BenchmarkId::from_parameter(split_mode),
            &split_mode,
            |b, &split_mode| b.iter(|| Qbvh::new(&scene, settings(split_mode)).unwrap()),
        );
    }
    group.finish();

    let mut group = c.benchmark_group("intersect");
    for split_mode in [SplitMode::Object, SplitMode::Spatial] {
        let bvh = Qbvh::new(&scene, settings(split_mode)).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(split_mode), &bvh, |b, bvh| {
            b.iter(|| {
                rays.iter()
                    .filter(|ray| {
                        let mut ray = **ray;
                        bvh.intersect(&mut ray).is_some()
                    })
                    .count()
            })
        });
    }
    group.finish();

    let bvh = Qbvh::new(&scene, settings(SplitMode::Object)).unwrap();
    c.bench_function("intersect_p", |b| {
        b.iter(|| rays.iter().filter(|ray| bvh.intersect_p(ray)).count())
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(20).measurement_time(Duration::from_secs(20));
    targets = criterion_benchmark
}
criterion_main!(benches);
