use std::ops::{Add, Index, IndexMut, Mul};

use nalgebra::Unit;

use super::{
    FloatType, Intersection, Ray, TexturePoint, WorldPoint, WorldVector, coordinate_system,
};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Triangle<Point>([Point; 3]);

impl<Point> Triangle<Point> {
    pub fn new(a: Point, b: Point, c: Point) -> Triangle<Point> {
        Triangle([a, b, c])
    }

    pub fn iter<'a>(&'a self) -> impl Iterator<Item = &'a Point> {
        self.0.iter()
    }

    pub fn map<Point2, F: FnMut(&Point) -> Point2>(&self, mut f: F) -> Triangle<Point2> {
        Triangle([f(&self[0]), f(&self[1]), f(&self[2])])
    }
}

impl<Point> Index<usize> for Triangle<Point> {
    type Output = Point;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl<Point> IndexMut<usize> for Triangle<Point> {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.0[index]
    }
}

impl<Point> From<[Point; 3]> for Triangle<Point> {
    fn from(value: [Point; 3]) -> Self {
        Triangle(value)
    }
}

/// Texture coordinates used for triangles that don't have any.
pub fn default_texture_coords() -> Triangle<TexturePoint> {
    Triangle::new(
        TexturePoint::new(0.0, 0.0),
        TexturePoint::new(1.0, 0.0),
        TexturePoint::new(1.0, 1.0),
    )
}

impl Triangle<WorldPoint> {
    /// Returns edge vectors, coming from self[0]
    pub fn edges(&self) -> [WorldVector; 2] {
        [self[1] - self[0], self[2] - self[0]]
    }

    /// Returns a normal vector of the triangle, not normalized.
    pub fn normal(&self) -> WorldVector {
        let [e1, e2] = self.edges();
        e1.cross(&e2)
    }

    /// Calculates ray intersection with the (two sided) triangle within the ray's [min_t, max_t] range.
    /// Returns distance along the ray and barycentric coordinates of the hit.
    pub fn intersect(&self, ray: &Ray) -> Option<(FloatType, BarycentricCoordinates<FloatType>)> {
        let [e1, e2] = self.edges();
        let terms = super::ray_triangle_intersection::moller_trumbore(
            1.0,
            [ray.origin.x, ray.origin.y, ray.origin.z],
            [ray.direction.x, ray.direction.y, ray.direction.z],
            [self[0].x, self[0].y, self[0].z],
            [e1.x, e1.y, e1.z],
            [e2.x, e2.y, e2.z],
        );

        let hit = terms.divisor != 0.0
            && terms.b1 >= 0.0
            && terms.b2 >= 0.0
            && terms.b0 >= 0.0
            && terms.t > ray.min_t
            && terms.t < ray.max_t;

        hit.then_some((
            terms.t,
            BarycentricCoordinates {
                u: terms.b1,
                v: terms.b2,
            },
        ))
    }
}

impl Intersection {
    /// Fills in the surface details of a triangle hit.
    /// The triangle is given by its first vertex and the two edges going from it.
    pub fn from_triangle_hit(
        t: FloatType,
        uv: BarycentricCoordinates<FloatType>,
        origin: &WorldPoint,
        edges: &[WorldVector; 2],
        texture_coords: &Triangle<TexturePoint>,
    ) -> Intersection {
        let [e1, e2] = edges;
        let point = origin + e1 * uv.u + e2 * uv.v;
        let normal = Unit::new_normalize(e1.cross(e2));

        let du1 = texture_coords[0].x - texture_coords[2].x;
        let du2 = texture_coords[1].x - texture_coords[2].x;
        let dv1 = texture_coords[0].y - texture_coords[2].y;
        let dv2 = texture_coords[1].y - texture_coords[2].y;
        // Vertex differences relative to the third vertex
        let dp1 = -e2;
        let dp2 = e1 - e2;

        let determinant = du1 * dv2 - dv1 * du2;
        let (dpdu, dpdv) = if determinant == 0.0 {
            coordinate_system(&normal)
        } else {
            let inv_determinant = 1.0 / determinant;
            (
                (dp1 * dv2 - dp2 * dv1) * inv_determinant,
                (dp2 * du1 - dp1 * du2) * inv_determinant,
            )
        };

        let texture_coords = TexturePoint::from(uv.interpolate(
            texture_coords[0].coords,
            texture_coords[1].coords,
            texture_coords[2].coords,
        ));

        Intersection {
            t,
            point,
            normal,
            dpdu,
            dpdv,
            texture_coords,
            uv,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct BarycentricCoordinates<T> {
    pub u: T,
    pub v: T,
}

impl BarycentricCoordinates<FloatType> {
    pub fn interpolate<T2>(&self, a: T2, b: T2, c: T2) -> T2
    where
        T2: Mul<FloatType, Output = T2> + Add<Output = T2>,
    {
        let w = 1.0 - self.u - self.v;
        a * w + b * self.u + c * self.v
    }

    pub fn interpolate_triangle<T2>(&self, triangle: &Triangle<T2>) -> T2
    where
        T2: Mul<FloatType, Output = T2> + Add<Output = T2> + Copy,
    {
        self.interpolate(triangle[0], triangle[1], triangle[2])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::{assert, let_assert};
    use proptest::prop_assert;
    use test_strategy::proptest;

    use crate::geometry::test::{NonzeroWorldVectorWrapper, WorldPointWrapper};

    fn xy_triangle() -> Triangle<WorldPoint> {
        Triangle::new(
            WorldPoint::new(0.0, 0.0, 0.0),
            WorldPoint::new(1.0, 0.0, 0.0),
            WorldPoint::new(0.0, 1.0, 0.0),
        )
    }

    #[test]
    fn hit_from_above() {
        let r = Ray::new(WorldPoint::new(0.25, 0.25, 2.0), WorldVector::new(0.0, 0.0, -1.0));
        let_assert!(Some((t, uv)) = xy_triangle().intersect(&r));
        assert!(t == 2.0);
        assert!(uv == BarycentricCoordinates { u: 0.25, v: 0.25 });
    }

    #[test]
    fn hit_from_below() {
        let r = Ray::new(WorldPoint::new(0.25, 0.25, -2.0), WorldVector::new(0.0, 0.0, 1.0));
        assert!(xy_triangle().intersect(&r).is_some());
    }

    #[test]
    fn miss_outside() {
        let r = Ray::new(WorldPoint::new(0.75, 0.75, 2.0), WorldVector::new(0.0, 0.0, -1.0));
        assert!(xy_triangle().intersect(&r).is_none());
    }

    #[test]
    fn miss_parallel() {
        let r = Ray::new(WorldPoint::new(-1.0, 0.25, 0.0), WorldVector::new(1.0, 0.0, 0.0));
        assert!(xy_triangle().intersect(&r).is_none());
    }

    #[test]
    fn ray_range_is_respected() {
        let r = Ray::with_range(
            WorldPoint::new(0.25, 0.25, 2.0),
            WorldVector::new(0.0, 0.0, -1.0),
            0.0,
            1.5,
        );
        assert!(xy_triangle().intersect(&r).is_none());

        let r = Ray::with_range(
            WorldPoint::new(0.25, 0.25, 2.0),
            WorldVector::new(0.0, 0.0, -1.0),
            2.0,
            10.0,
        );
        assert!(xy_triangle().intersect(&r).is_none());
    }

    #[test]
    fn hit_details() {
        let triangle = xy_triangle();
        let r = Ray::new(WorldPoint::new(0.25, 0.5, 2.0), WorldVector::new(0.0, 0.0, -1.0));
        let_assert!(Some((t, uv)) = triangle.intersect(&r));

        let isect = Intersection::from_triangle_hit(
            t,
            uv,
            &triangle[0],
            &triangle.edges(),
            &default_texture_coords(),
        );
        assert!(isect.point == WorldPoint::new(0.25, 0.5, 0.0));
        assert!(*isect.normal == WorldVector::new(0.0, 0.0, 1.0));
        assert!(isect.dpdu.dot(&isect.normal).abs() < 1e-6);
        assert!(isect.dpdv.dot(&isect.normal).abs() < 1e-6);
    }

    #[test]
    fn degenerate_texture_coords_fall_back_to_coordinate_system() {
        let triangle = xy_triangle();
        let uvs = Triangle::new(TexturePoint::origin(), TexturePoint::origin(), TexturePoint::origin());
        let isect = Intersection::from_triangle_hit(
            1.0,
            BarycentricCoordinates { u: 0.2, v: 0.2 },
            &triangle[0],
            &triangle.edges(),
            &uvs,
        );
        assert!(isect.dpdu.norm() > 0.5);
        assert!(isect.dpdv.norm() > 0.5);
        assert!(isect.texture_coords == TexturePoint::origin());
    }

    #[test]
    fn interpolate_vertices() {
        let t = xy_triangle().map(|p| p.coords);
        let uv = BarycentricCoordinates { u: 0.5, v: 0.25 };
        assert!(uv.interpolate_triangle(&t) == WorldVector::new(0.5, 0.25, 0.0));
    }

    /// Aiming at a point inside the triangle always hits it, and the hit is where we aimed.
    #[proptest]
    fn aimed_ray_hits(
        a: WorldPointWrapper,
        b: WorldPointWrapper,
        c: WorldPointWrapper,
        offset: NonzeroWorldVectorWrapper,
        #[strategy(0.1f32..0.45)] u: f32,
        #[strategy(0.1f32..0.45)] v: f32,
    ) {
        let triangle = Triangle::new(*a, *b, *c);
        let n = triangle.normal();
        proptest::prop_assume!(n.norm() > 1e-2);
        proptest::prop_assume!(n.normalize().dot(&offset.normalize()).abs() > 0.1);

        let target = WorldPoint::from(BarycentricCoordinates { u, v }.interpolate_triangle(
            &triangle.map(|p| p.coords),
        ));
        let r = Ray::new(target + *offset, -*offset);

        let result = triangle.intersect(&r);
        prop_assert!(result.is_some());
        let (t, _) = result.unwrap();
        prop_assert!((r.point_at(t) - target).norm() < 1e-2);
    }
}
