pub mod obj;
pub mod primitives;
pub mod qbvh;

use std::{fmt::Debug, sync::Arc};

use crate::geometry::{
    Intersection, Ray, TexturePoint, Triangle, WorldBox, WorldPoint, default_texture_coords,
};

pub type PrimitiveRef = Arc<dyn Primitive>;

/// Renderable object, as seen by the accelerator.
pub trait Primitive: Debug + Send + Sync {
    fn world_bound(&self) -> WorldBox;

    /// Finds the closest hit within the ray's [min_t, max_t] range.
    /// On hit the ray's `max_t` is shrunk to the hit distance.
    fn intersect(&self, ray: &mut Ray) -> Option<Intersection>;

    /// Any hit within the ray's range.
    fn intersect_p(&self, ray: &Ray) -> bool;

    /// Primitives that can't be intersected directly must be refined first.
    fn can_intersect(&self) -> bool {
        true
    }

    /// Pushes the simpler primitives this one consists of.
    fn refine(&self, _refined: &mut Vec<PrimitiveRef>) {}

    /// Vertices, if this primitive is a single triangle.
    fn triangle_vertices(&self) -> Option<Triangle<WorldPoint>> {
        None
    }

    /// Texture coordinates at the triangle vertices.
    fn triangle_texture_coords(&self) -> Triangle<TexturePoint> {
        default_texture_coords()
    }
}

/// Refines primitives until all of them can be intersected directly.
pub fn refine_all(primitives: &[PrimitiveRef]) -> Vec<PrimitiveRef> {
    let mut ret = Vec::with_capacity(primitives.len());
    let mut todo: Vec<PrimitiveRef> = primitives.iter().rev().cloned().collect();
    let mut refined = Vec::new();

    while let Some(primitive) = todo.pop() {
        if primitive.can_intersect() {
            ret.push(primitive);
        } else {
            primitive.refine(&mut refined);
            todo.extend(refined.drain(..).rev());
        }
    }

    ret
}
