use std::array;

use super::QUAD_SIZE;
use crate::{
    geometry::{BarycentricCoordinates, Intersection, Ray, SimdRay, Triangle4},
    scene::PrimitiveRef,
    util::{mask_lanes, simd::SimdFloatExt as _},
};

/// Up to four primitives of a leaf, tested together.
/// Unused slots repeat the last real primitive.
#[derive(Clone, Debug)]
pub enum QuadGroup {
    /// All four slots are triangles, tested with a single SIMD kernel
    Triangle(QuadTriangle),
    /// Anything else, tested one by one
    Generic(QuadGeneric),
}

#[derive(Clone, Debug)]
pub struct QuadTriangle {
    triangles: Triangle4,
    slots: QuadSlots,
}

#[derive(Clone, Debug)]
pub struct QuadGeneric {
    slots: QuadSlots,
}

#[derive(Clone, Debug)]
struct QuadSlots {
    primitives: [PrimitiveRef; QUAD_SIZE],
    len: usize,
}

impl QuadGroup {
    /// Panics if `primitives` is empty or longer than four.
    pub fn new(primitives: &[PrimitiveRef]) -> QuadGroup {
        assert!(!primitives.is_empty());
        assert!(primitives.len() <= QUAD_SIZE);

        let last = primitives.len() - 1;
        let slots = QuadSlots {
            primitives: array::from_fn(|i| primitives[i.min(last)].clone()),
            len: primitives.len(),
        };

        if let [Some(a), Some(b), Some(c), Some(d)] =
            slots.primitives.each_ref().map(|p| p.triangle_vertices())
        {
            QuadGroup::Triangle(QuadTriangle {
                triangles: Triangle4::new(&[a, b, c, d]),
                slots,
            })
        } else {
            QuadGroup::Generic(QuadGeneric { slots })
        }
    }

    fn slots(&self) -> &QuadSlots {
        match self {
            QuadGroup::Triangle(q) => &q.slots,
            QuadGroup::Generic(q) => &q.slots,
        }
    }

    /// Number of real (not padding) primitives.
    pub fn len(&self) -> usize {
        self.slots().len
    }

    /// The real primitives, without padding.
    pub fn primitives(&self) -> &[PrimitiveRef] {
        let slots = self.slots();
        &slots.primitives[..slots.len]
    }

    pub fn primitive(&self, slot: usize) -> &PrimitiveRef {
        &self.slots().primitives[slot]
    }

    /// Closest hit within the ray's range, shrinks `ray.max_t` on hit.
    /// Returns the intersection and the slot of the primitive that was hit.
    pub fn intersect(&self, simd_ray: &SimdRay, ray: &mut Ray) -> Option<(Intersection, usize)> {
        match self {
            QuadGroup::Triangle(q) => q.intersect(simd_ray, ray),
            QuadGroup::Generic(q) => q.intersect(ray),
        }
    }

    pub fn intersect_p(&self, simd_ray: &SimdRay, ray: &Ray) -> bool {
        match self {
            QuadGroup::Triangle(q) => q.triangles.intersect(simd_ray, ray.min_t, ray.max_t).0 != 0,
            QuadGroup::Generic(q) => q.slots.primitives[..q.slots.len]
                .iter()
                .any(|p| p.intersect_p(ray)),
        }
    }
}

impl QuadTriangle {
    fn intersect(&self, simd_ray: &SimdRay, ray: &mut Ray) -> Option<(Intersection, usize)> {
        let (mask, t, uv) = self.triangles.intersect(simd_ray, ray.min_t, ray.max_t);

        let mut closest = None;
        for lane in mask_lanes(mask) {
            let lane_t = t.lane(lane);
            if lane_t < ray.max_t {
                ray.max_t = lane_t;
                closest = Some(lane);
            }
        }
        let lane = closest?;

        let (origin, edges) = self.triangles.extract(lane);
        let uv = BarycentricCoordinates {
            u: uv.u.lane(lane),
            v: uv.v.lane(lane),
        };
        let intersection = Intersection::from_triangle_hit(
            ray.max_t,
            uv,
            &origin,
            &edges,
            &self.slots.primitives[lane].triangle_texture_coords(),
        );
        Some((intersection, lane))
    }
}

impl QuadGeneric {
    fn intersect(&self, ray: &mut Ray) -> Option<(Intersection, usize)> {
        let mut ret = None;
        // Padding slots only repeat the last primitive
        for (slot, primitive) in self.slots.primitives[..self.slots.len].iter().enumerate() {
            if let Some(intersection) = primitive.intersect(ray) {
                ret = Some((intersection, slot));
            }
        }
        ret
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use assert2::{assert, let_assert};

    use crate::{
        geometry::{WorldPoint, WorldVector},
        scene::{primitives::Sphere, test::triangle},
    };

    fn layer(z: f32) -> PrimitiveRef {
        triangle([-1.0, -1.0, z], [1.0, -1.0, z], [0.0, 1.0, z])
    }

    fn down_ray() -> Ray {
        Ray::new(WorldPoint::new(0.0, 0.0, 10.0), WorldVector::new(0.0, 0.0, -1.0))
    }

    #[test]
    fn padding_repeats_last() {
        let primitives = [layer(0.0), layer(1.0)];
        let quad = QuadGroup::new(&primitives);

        let_assert!(QuadGroup::Triangle(_) = &quad);
        assert!(quad.len() == 2);
        assert!(quad.primitives().len() == 2);
        assert!(Arc::ptr_eq(quad.primitive(0), &primitives[0]));
        for slot in 1..QUAD_SIZE {
            assert!(Arc::ptr_eq(quad.primitive(slot), &primitives[1]));
        }
    }

    #[test]
    fn any_non_triangle_makes_generic() {
        let sphere: PrimitiveRef = Arc::new(Sphere {
            center: WorldPoint::new(0.0, 0.0, 5.0),
            radius: 1.0,
        });
        let quad = QuadGroup::new(&[layer(0.0), sphere]);
        let_assert!(QuadGroup::Generic(_) = &quad);

        let mut ray = down_ray();
        let_assert!(Some((intersection, slot)) = quad.intersect(&SimdRay::from(&ray), &mut ray));
        assert!(slot == 1);
        assert!(intersection.t == 4.0);
        assert!(ray.max_t == 4.0);
    }

    #[test]
    fn closest_triangle_lane_wins() {
        let primitives = [layer(1.0), layer(3.0), layer(2.0), layer(-1.0)];
        let quad = QuadGroup::new(&primitives);

        let mut ray = down_ray();
        let simd_ray = SimdRay::from(&ray);
        let_assert!(Some((intersection, slot)) = quad.intersect(&simd_ray, &mut ray));

        assert!(slot == 1);
        assert!(intersection.t == 7.0);
        assert!(ray.max_t == 7.0);
        assert!(intersection.point == WorldPoint::new(0.0, 0.0, 3.0));

        let_assert!(Some(expected) = primitives[1].intersect(&mut down_ray()));
        assert!(intersection == expected);
    }

    #[test]
    fn respects_ray_range() {
        let quad = QuadGroup::new(&[layer(1.0), layer(3.0)]);

        let mut ray = Ray::with_range(
            WorldPoint::new(0.0, 0.0, 10.0),
            WorldVector::new(0.0, 0.0, -1.0),
            0.0,
            5.0,
        );
        let simd_ray = SimdRay::from(&ray);
        assert!(!quad.intersect_p(&simd_ray, &ray));
        assert!(quad.intersect(&simd_ray, &mut ray).is_none());
        assert!(ray.max_t == 5.0);

        let ray = down_ray();
        assert!(quad.intersect_p(&SimdRay::from(&ray), &ray));
    }
}
