pub mod geometry;
pub mod scene;
mod util;

pub use scene::{
    Primitive, PrimitiveRef,
    primitives::{Sphere, TriangleMesh},
    qbvh::{BuildError, BuildReport, Hit, Qbvh, QbvhSettings, QbvhStatistics, SplitMode},
};
pub use util::Stats;
