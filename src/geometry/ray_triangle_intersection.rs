use std::ops::{Add, Div, Mul, Sub};

use wide::{CmpEq, CmpGe, CmpGt, CmpLt};

use super::{
    BarycentricCoordinates, FloatType, SimdFloatType, SimdRay, Triangle, WorldPoint, WorldPoint4,
    WorldVector, WorldVector4,
};
use crate::util::simd::{extract_point, extract_vector, gather_points, gather_vectors};

/// Intermediate values of the Möller-Trumbore test.
pub(super) struct HitTerms<T> {
    pub divisor: T,
    pub b0: T,
    pub b1: T,
    pub b2: T,
    pub t: T,
}

fn cross<T>(a: [T; 3], b: [T; 3]) -> [T; 3]
where
    T: Copy + Sub<Output = T> + Mul<Output = T>,
{
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn dot<T>(a: [T; 3], b: [T; 3]) -> T
where
    T: Copy + Add<Output = T> + Mul<Output = T>,
{
    a[0] * b[0] + (a[1] * b[1] + a[2] * b[2])
}

/// Shared arithmetic of the scalar and the 4-wide ray triangle test.
/// Both variants go through exactly the same operations, so they agree to the last bit.
pub(super) fn moller_trumbore<T>(
    one: T,
    origin: [T; 3],
    direction: [T; 3],
    v0: [T; 3],
    edge1: [T; 3],
    edge2: [T; 3],
) -> HitTerms<T>
where
    T: Copy + Add<Output = T> + Sub<Output = T> + Mul<Output = T> + Div<Output = T>,
{
    let s1 = cross(direction, edge2);
    let divisor = dot(s1, edge1);

    let d = [origin[0] - v0[0], origin[1] - v0[1], origin[2] - v0[2]];
    let b1 = dot(d, s1) / divisor;

    let s2 = cross(d, edge1);
    let b2 = dot(direction, s2) / divisor;
    let b0 = one - (b1 + b2);

    let t = dot(edge2, s2) / divisor;

    HitTerms {
        divisor,
        b0,
        b1,
        b2,
        t,
    }
}

/// Four triangles in SoA layout, stored as a vertex and two edges each.
#[derive(Clone, Debug)]
pub struct Triangle4 {
    pub origin: WorldPoint4,
    pub edge1: WorldVector4,
    pub edge2: WorldVector4,
}

impl Triangle4 {
    pub fn new(triangles: &[Triangle<WorldPoint>; 4]) -> Triangle4 {
        let edges = triangles.each_ref().map(Triangle::edges);
        Triangle4 {
            origin: gather_points(triangles.each_ref().map(|t| t[0])),
            edge1: gather_vectors(edges.map(|[e1, _]| e1)),
            edge2: gather_vectors(edges.map(|[_, e2]| e2)),
        }
    }

    /// Vertex and edges of a single lane, as used to fill in intersection details.
    pub fn extract(&self, lane: usize) -> (WorldPoint, [WorldVector; 2]) {
        (
            extract_point(&self.origin, lane),
            [
                extract_vector(&self.edge1, lane),
                extract_vector(&self.edge2, lane),
            ],
        )
    }

    /// Calculates ray intersection with the (two sided) triangle pack.
    /// Returns mask of valid intersections within (min_t, max_t), distance along ray,
    /// and barycentric uv coordinates.
    pub fn intersect(
        &self,
        ray: &SimdRay,
        min_t: FloatType,
        max_t: FloatType,
    ) -> (u32, SimdFloatType, BarycentricCoordinates<SimdFloatType>) {
        let terms = moller_trumbore(
            SimdFloatType::ONE,
            [ray.origin.x, ray.origin.y, ray.origin.z],
            [ray.direction.x, ray.direction.y, ray.direction.z],
            [self.origin.x, self.origin.y, self.origin.z],
            [self.edge1.x, self.edge1.y, self.edge1.z],
            [self.edge2.x, self.edge2.y, self.edge2.z],
        );

        let zero = SimdFloatType::ZERO;
        let mask = !terms.divisor.cmp_eq(zero)
            & terms.b0.cmp_ge(zero)
            & terms.b1.cmp_ge(zero)
            & terms.b2.cmp_ge(zero)
            & terms.t.cmp_gt(SimdFloatType::splat(min_t))
            & terms.t.cmp_lt(SimdFloatType::splat(max_t));

        (
            mask.move_mask() as u32,
            terms.t,
            BarycentricCoordinates {
                u: terms.b1,
                v: terms.b2,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::assert;
    use proptest::prop_assert;
    use test_strategy::proptest;

    use crate::{
        geometry::{
            Ray,
            test::{NonzeroWorldVectorWrapper, WorldPointWrapper},
        },
        util::simd::SimdFloatExt as _,
    };

    fn triangle(a: [f32; 3], b: [f32; 3], c: [f32; 3]) -> Triangle<WorldPoint> {
        Triangle::new(a.into(), b.into(), c.into())
    }

    #[test]
    fn lanes_are_independent() {
        let triangles = [
            triangle([0.0, 0.0, 1.0], [1.0, 0.0, 1.0], [0.0, 1.0, 1.0]),
            triangle([5.0, 5.0, 1.0], [6.0, 5.0, 1.0], [5.0, 6.0, 1.0]),
            triangle([0.0, 0.0, 3.0], [1.0, 0.0, 3.0], [0.0, 1.0, 3.0]),
            triangle([0.0, 0.0, -3.0], [1.0, 0.0, -3.0], [0.0, 1.0, -3.0]),
        ];
        let tri4 = Triangle4::new(&triangles);
        let r = Ray::new(WorldPoint::new(0.2, 0.2, 0.0), WorldVector::new(0.0, 0.0, 1.0));

        let (mask, t, _) = tri4.intersect(&SimdRay::from(&r), r.min_t, r.max_t);

        assert!(mask == 0b0101);
        assert!(t.lane(0) == 1.0);
        assert!(t.lane(2) == 3.0);
    }

    #[test]
    fn extract_returns_the_lane() {
        let triangles = [
            triangle([0.0, 0.0, 1.0], [1.0, 0.0, 1.0], [0.0, 1.0, 1.0]),
            triangle([5.0, 5.0, 1.0], [6.0, 5.0, 1.0], [5.0, 6.0, 1.0]),
            triangle([0.0, 0.0, 3.0], [1.0, 0.0, 3.0], [0.0, 1.0, 3.0]),
            triangle([0.0, 0.0, -3.0], [1.0, 0.0, -3.0], [0.0, 1.0, -3.0]),
        ];
        let tri4 = Triangle4::new(&triangles);
        let (origin, edges) = tri4.extract(1);
        assert!(origin == triangles[1][0]);
        assert!(edges == triangles[1].edges());
    }

    /// The packed test must give exactly the same answer as the scalar one.
    #[proptest]
    fn matches_scalar(
        a: WorldPointWrapper,
        b: WorldPointWrapper,
        c: WorldPointWrapper,
        origin: WorldPointWrapper,
        direction: NonzeroWorldVectorWrapper,
    ) {
        let t = Triangle::new(*a, *b, *c);
        let other = triangle([100.0, 100.0, 100.0], [101.0, 100.0, 100.0], [100.0, 101.0, 100.0]);
        let tri4 = Triangle4::new(&[other, t, other, t]);
        let r = Ray::new(*origin, *direction);

        let scalar = t.intersect(&r);
        let (mask, simd_t, simd_uv) = tri4.intersect(&SimdRay::from(&r), r.min_t, r.max_t);

        prop_assert!((mask & 0b0010 != 0) == scalar.is_some());
        prop_assert!((mask & 0b1000 != 0) == scalar.is_some());
        if let Some((scalar_t, scalar_uv)) = scalar {
            prop_assert!(simd_t.lane(1) == scalar_t);
            prop_assert!(simd_uv.u.lane(1) == scalar_uv.u);
            prop_assert!(simd_uv.v.lane(1) == scalar_uv.v);
        }
    }
}
