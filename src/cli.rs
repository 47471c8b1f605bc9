use std::{env, sync::Arc, time::Instant};

use anyhow::{Context, bail};
use indicatif::ProgressBar;
use log::info;
use qbvh::{
    PrimitiveRef, Qbvh, QbvhSettings, TriangleMesh,
    geometry::{Ray, WorldBox, WorldPoint, WorldVector},
};
use rand::{Rng, SeedableRng, rngs::SmallRng};

const USAGE: &str = "Usage: qbvh-cli <mesh.obj> [--tree] [rays=N] [accelerator=qbvh|sqbvh] \
                     [maxprimsperleaf=N] [fullsweepthreshold=N] [skipfactor=N] [alpha=X]";
const DEFAULT_RAY_COUNT: u64 = 1_000_000;
const PROGRESS_STEP: u64 = 1 << 12;

fn random_point_in(bounds: &WorldBox, rng: &mut SmallRng) -> WorldPoint {
    let t = WorldVector::new(rng.random(), rng.random(), rng.random());
    bounds.min + (bounds.max - bounds.min).component_mul(&t)
}

fn random_direction(rng: &mut SmallRng) -> WorldVector {
    loop {
        let v = WorldVector::new(
            rng.random_range(-1.0..1.0),
            rng.random_range(-1.0..1.0),
            rng.random_range(-1.0..1.0),
        );
        let norm = v.norm();
        if norm > 1e-3 && norm <= 1.0 {
            return v / norm;
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = env::args().skip(1);
    let Some(path) = args.next() else {
        bail!(USAGE);
    };

    let mut params = Vec::new();
    let mut ray_count = DEFAULT_RAY_COUNT;
    let mut print_tree = false;
    for arg in args {
        if arg == "--tree" {
            print_tree = true;
            continue;
        }
        let Some((key, value)) = arg.split_once('=') else {
            bail!("Expected key=value, got {arg:?}\n{USAGE}");
        };
        if key == "rays" {
            ray_count = value
                .parse()
                .with_context(|| format!("Invalid ray count {value:?}"))?;
        } else {
            params.push((key.to_owned(), value.to_owned()));
        }
    }
    let settings = QbvhSettings::from_params(params)?;

    let mesh = TriangleMesh::with_obj(&path).with_context(|| format!("Loading {path}"))?;
    let start = Instant::now();
    let bvh = Qbvh::new(&[Arc::new(mesh) as PrimitiveRef], settings)?;
    info!(
        "Built {} over {} primitives in {:.2?}",
        bvh.settings().split_mode,
        bvh.primitive_count(),
        start.elapsed()
    );

    let stats = bvh.statistics();
    info!(
        "SAH cost {:.3}, {} nodes, {} quad groups, {:.2} references per leaf",
        stats.sah_cost,
        stats.node_count,
        bvh.quad_count(),
        stats.avg_leaf_primitive_references
    );
    if print_tree {
        bvh.print_tree();
    }

    let bounds = bvh.world_bound();
    if !bounds.is_valid() {
        info!("Scene is empty, nothing to trace");
        return Ok(());
    }
    let center = bounds.center();
    let radius = (bounds.max - bounds.min).norm();

    // Rays from a sphere around the scene towards random points inside it
    let mut rng = SmallRng::seed_from_u64(0);
    let bar = ProgressBar::new(ray_count);
    let mut hits = 0u64;
    let start = Instant::now();
    for i in 0..ray_count {
        let origin = center + random_direction(&mut rng) * radius;
        let target = random_point_in(&bounds, &mut rng);
        let mut ray = Ray::new(origin, target - origin);
        if bvh.intersect(&mut ray).is_some() {
            hits += 1;
        }
        if i % PROGRESS_STEP == 0 {
            bar.set_position(i);
        }
    }
    bar.finish_and_clear();

    let elapsed = start.elapsed();
    info!(
        "{hits} of {ray_count} rays hit in {elapsed:.2?}, {:.2} Mrays/s",
        ray_count as f64 / elapsed.as_secs_f64() / 1e6
    );

    Ok(())
}
