use wide::CmpGe;

use crate::{
    geometry::{FloatType, SimdFloatType, SimdRay, WorldBox4},
    util::simd::SimdFloatExt as _,
};

impl WorldBox4 {
    /// Calculates ray intersection with the box pack, limited to the [min_t, max_t] range.
    /// Returns entry and exit distance along the ray, the ray intersects a box if entry <= exit.
    pub fn entry_exit(
        &self,
        ray: &SimdRay,
        min_t: FloatType,
        max_t: FloatType,
    ) -> (SimdFloatType, SimdFloatType) {
        let mut entry = SimdFloatType::splat(min_t);
        let mut exit = SimdFloatType::splat(max_t);

        for axis in 0..3 {
            let near = self.corner(ray.signs[axis])[axis];
            let far = self.corner(1 - ray.signs[axis])[axis];

            // The multiplication is NAN if the ray is starting inside the slab bounding plane
            // and is parallel to it. In this case we blend to +-infinity, so that the range becomes infinite
            let to_near = ((near - ray.origin[axis]) * ray.inv_direction[axis])
                .nan_to(FloatType::NEG_INFINITY);
            let to_far =
                ((far - ray.origin[axis]) * ray.inv_direction[axis]).nan_to(FloatType::INFINITY);

            entry = entry.max(to_near);
            exit = exit.min(to_far);
        }

        (entry, exit)
    }

    /// Returns bit mask of boxes hit by the ray within the [min_t, max_t] range.
    pub fn intersect(&self, ray: &SimdRay, min_t: FloatType, max_t: FloatType) -> u32 {
        let (entry, exit) = self.entry_exit(ray, min_t, max_t);
        exit.cmp_ge(entry).move_mask() as u32
    }
}
