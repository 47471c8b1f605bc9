use std::ops::Sub;

use arrayvec::ArrayVec;
use itertools::Itertools as _;

use super::{
    FloatType, Triangle, WorldBox, WorldBox4, WorldPoint, WorldPoint4, WorldVector, machine_epsilon,
};
use crate::util::simd::{SimdFloatExt as _, extract_point, splat_point};

/// Maximum vertex count of a triangle clipped by the six planes of a box.
pub const MAX_CLIPPED_VERTICES: usize = 9;
pub type ClippedPolygon = ArrayVec<WorldPoint, MAX_CLIPPED_VERTICES>;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AABB<Point> {
    pub min: Point,
    pub max: Point,
}

impl<Point> AABB<Point> {
    pub fn new(min: Point, max: Point) -> AABB<Point> {
        AABB { min, max }
    }

    pub fn map<Point2, F: FnMut(&Point) -> Point2>(&self, mut f: F) -> AABB<Point2> {
        AABB {
            min: f(&self.min),
            max: f(&self.max),
        }
    }
}

impl<Point: Sub + Copy> AABB<Point> {
    pub fn size(&self) -> Point::Output {
        self.max - self.min
    }
}

impl<Point> From<[Point; 2]> for AABB<Point> {
    fn from(value: [Point; 2]) -> Self {
        let [min, max] = value;
        AABB { min, max }
    }
}

impl<Point> From<(Point, Point)> for AABB<Point> {
    fn from(value: (Point, Point)) -> Self {
        let (min, max) = value;
        AABB { min, max }
    }
}

impl WorldBox {
    /// Box containing nothing, neutral element of `union`.
    pub fn empty() -> WorldBox {
        AABB {
            min: WorldPoint::new(FloatType::INFINITY, FloatType::INFINITY, FloatType::INFINITY),
            max: WorldPoint::new(
                FloatType::NEG_INFINITY,
                FloatType::NEG_INFINITY,
                FloatType::NEG_INFINITY,
            ),
        }
    }

    pub fn from_point(p: &WorldPoint) -> WorldBox {
        AABB { min: *p, max: *p }
    }

    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a WorldPoint>) -> WorldBox {
        points
            .into_iter()
            .fold(WorldBox::empty(), |b, p| b.union_point(p))
    }

    /// The box contains at least a single point.
    pub fn is_valid(&self) -> bool {
        (0..3).all(|i| self.min[i] <= self.max[i])
    }

    pub fn union(&self, other: &WorldBox) -> WorldBox {
        AABB {
            min: self.min.inf(&other.min),
            max: self.max.sup(&other.max),
        }
    }

    pub fn union_point(&self, p: &WorldPoint) -> WorldBox {
        AABB {
            min: self.min.inf(p),
            max: self.max.sup(p),
        }
    }

    /// Common part of the two boxes, None if they don't overlap
    pub fn intersection(&self, other: &WorldBox) -> Option<WorldBox> {
        let result = AABB {
            min: self.min.sup(&other.min),
            max: self.max.inf(&other.max),
        };
        result.is_valid().then_some(result)
    }

    /// Checks that `other` is completely inside self.
    /// Invalid boxes are contained in everything.
    pub fn contains_box(&self, other: &WorldBox) -> bool {
        !other.is_valid()
            || (0..3).all(|i| self.min[i] <= other.min[i] && other.max[i] <= self.max[i])
    }

    pub fn center(&self) -> WorldPoint {
        WorldPoint::from((self.min.coords + self.max.coords) * 0.5)
    }

    /// Zero for invalid boxes.
    pub fn surface_area(&self) -> FloatType {
        if !self.is_valid() {
            return 0.0;
        }
        let d = self.size();
        2.0 * (d.x * d.y + d.y * d.z + d.z * d.x)
    }

    /// Index of the longest axis
    pub fn maximum_extent(&self) -> usize {
        let d = self.size();
        if d.x > d.y && d.x > d.z {
            0
        } else if d.y > d.z {
            1
        } else {
            2
        }
    }

    /// Grows the box by `delta` in every direction.
    pub fn expand(&mut self, delta: FloatType) {
        let delta = WorldVector::repeat(delta);
        self.min -= delta;
        self.max += delta;
    }

    /// Largest machine epsilon of any of the box coordinates.
    pub fn machine_epsilon(&self) -> FloatType {
        self.min
            .iter()
            .chain(self.max.iter())
            .map(|x| machine_epsilon(*x))
            .fold(0.0, FloatType::max)
    }

    /// The box expanded by its own machine epsilon.
    pub fn expanded_by_epsilon(&self) -> WorldBox {
        let mut ret = *self;
        ret.expand(self.machine_epsilon());
        ret
    }

    /// Clips a triangle by the six planes of the box (Sutherland-Hodgman).
    /// Returns vertices of the part of the triangle inside the box, possibly empty.
    pub fn clip_polygon(&self, triangle: &Triangle<WorldPoint>) -> ClippedPolygon {
        let mut polygon: ClippedPolygon = triangle.iter().copied().collect();
        for axis in 0..3 {
            polygon = clip_by_plane(&polygon, axis, self.min[axis], true);
            polygon = clip_by_plane(&polygon, axis, self.max[axis], false);
        }
        polygon
    }
}

impl Default for WorldBox {
    fn default() -> Self {
        WorldBox::empty()
    }
}

/// Keeps the part of the polygon on one side of an axis aligned plane.
/// `keep_above` selects between keeping coordinates >= `bound` and <= `bound`.
fn clip_by_plane(
    polygon: &ClippedPolygon,
    axis: usize,
    bound: FloatType,
    keep_above: bool,
) -> ClippedPolygon {
    let distance = |p: &WorldPoint| {
        if keep_above {
            p[axis] - bound
        } else {
            bound - p[axis]
        }
    };

    let mut ret = ClippedPolygon::new();
    for (a, b) in polygon.iter().circular_tuple_windows() {
        let da = distance(a);
        let db = distance(b);
        if da >= 0.0 {
            ret.push(*a);
        }
        if (da >= 0.0) != (db >= 0.0) {
            let mut crossing = a + (b - a) * (da / (da - db));
            crossing[axis] = bound;
            ret.push(crossing);
        }
    }
    ret
}

impl WorldBox4 {
    pub fn empty() -> WorldBox4 {
        WorldBox::empty().map(splat_point)
    }

    pub fn extract(&self, lane: usize) -> WorldBox {
        self.map(|p| extract_point(p, lane))
    }

    pub fn set_lane(&mut self, lane: usize, b: &WorldBox) {
        for axis in 0..3 {
            self.min[axis].set_lane(lane, b.min[axis]);
            self.max[axis].set_lane(lane, b.max[axis]);
        }
    }

    /// Near (index 0) or far (index 1) corner coordinate, selected per axis by a ray direction sign.
    pub(super) fn corner(&self, index: usize) -> &WorldPoint4 {
        if index == 0 { &self.min } else { &self.max }
    }
}

impl Default for WorldBox4 {
    fn default() -> Self {
        WorldBox4::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::assert;
    use proptest::prop_assert;
    use test_case::test_case;
    use test_strategy::proptest;

    use crate::geometry::test::WorldPointWrapper;

    fn unit_box() -> WorldBox {
        WorldBox::new(WorldPoint::new(0.0, 0.0, 0.0), WorldPoint::new(1.0, 1.0, 1.0))
    }

    #[test]
    fn empty_box() {
        let b = WorldBox::empty();
        assert!(!b.is_valid());
        assert!(b.surface_area() == 0.0);
        assert!(b.union(&unit_box()) == unit_box());
        assert!(b.intersection(&unit_box()).is_none());
        assert!(unit_box().contains_box(&b));
    }

    #[test]
    fn degenerate_box_has_zero_area() {
        let b = WorldBox::from_point(&WorldPoint::new(1.0, 2.0, 3.0));
        assert!(b.is_valid());
        assert!(b.surface_area() == 0.0);
    }

    #[test]
    fn surface_area() {
        let b = WorldBox::new(WorldPoint::new(0.0, 0.0, 0.0), WorldPoint::new(1.0, 2.0, 3.0));
        assert!(b.surface_area() == 22.0);
    }

    #[test_case([1.0, 0.5, 0.5], 0 ; "x")]
    #[test_case([0.5, 1.0, 0.5], 1 ; "y")]
    #[test_case([0.5, 0.5, 1.0], 2 ; "z")]
    #[test_case([1.0, 1.0, 1.0], 2 ; "tie")]
    fn maximum_extent(size: [f32; 3], expected: usize) {
        let b = WorldBox::new(WorldPoint::origin(), size.into());
        assert!(b.maximum_extent() == expected);
    }

    #[test]
    fn intersection() {
        let a = unit_box();
        let b = WorldBox::new(WorldPoint::new(0.5, 0.5, 0.5), WorldPoint::new(2.0, 2.0, 2.0));
        let c = WorldBox::new(WorldPoint::new(1.5, 0.5, 0.5), WorldPoint::new(2.0, 2.0, 2.0));

        assert!(
            a.intersection(&b)
                == Some(WorldBox::new(
                    WorldPoint::new(0.5, 0.5, 0.5),
                    WorldPoint::new(1.0, 1.0, 1.0)
                ))
        );
        assert!(a.intersection(&c) == None);
    }

    #[test]
    fn expand() {
        let mut b = unit_box();
        b.expand(0.5);
        assert!(b.min == WorldPoint::new(-0.5, -0.5, -0.5));
        assert!(b.max == WorldPoint::new(1.5, 1.5, 1.5));
        assert!(unit_box().expanded_by_epsilon().contains_box(&unit_box()));
    }

    #[test]
    fn clip_triangle_inside() {
        let t = Triangle::new(
            WorldPoint::new(0.1, 0.1, 0.5),
            WorldPoint::new(0.9, 0.1, 0.5),
            WorldPoint::new(0.1, 0.9, 0.5),
        );
        let clipped = unit_box().clip_polygon(&t);
        assert!(clipped.as_slice() == t.iter().copied().collect::<Vec<_>>().as_slice());
    }

    #[test]
    fn clip_triangle_outside() {
        let t = Triangle::new(
            WorldPoint::new(2.0, 0.1, 0.5),
            WorldPoint::new(3.0, 0.1, 0.5),
            WorldPoint::new(2.0, 0.9, 0.5),
        );
        assert!(unit_box().clip_polygon(&t).is_empty());
    }

    #[test]
    fn clip_triangle_half() {
        let t = Triangle::new(
            WorldPoint::new(0.5, 0.0, 0.5),
            WorldPoint::new(1.5, 0.0, 0.5),
            WorldPoint::new(0.5, 1.0, 0.5),
        );
        let clipped = unit_box().clip_polygon(&t);
        let bounds = WorldBox::from_points(clipped.iter());
        assert!(clipped.len() == 4);
        assert!(bounds.max.x == 1.0);
        assert!(bounds.min.x == 0.5);
        assert!(bounds.max.y == 1.0);
    }

    #[proptest]
    fn clipped_polygon_is_inside_both(
        a: WorldPointWrapper,
        b: WorldPointWrapper,
        c: WorldPointWrapper,
        box_corner1: WorldPointWrapper,
        box_corner2: WorldPointWrapper,
    ) {
        let t = Triangle::new(*a, *b, *c);
        let clip_box = WorldBox::from_point(&box_corner1).union_point(&box_corner2);
        let clipped = clip_box.clip_polygon(&t);
        let bounds = WorldBox::from_points(clipped.iter());

        let triangle_bounds = WorldBox::from_points(t.iter()).expanded_by_epsilon();
        let clip_box = clip_box.expanded_by_epsilon();

        prop_assert!(clip_box.contains_box(&bounds), "{bounds:?} {clip_box:?}");
        prop_assert!(triangle_bounds.contains_box(&bounds), "{bounds:?} {triangle_bounds:?}");
    }

    #[test]
    fn box4_lanes() {
        let mut b4 = WorldBox4::empty();
        let b = WorldBox::new(WorldPoint::new(1.0, 2.0, 3.0), WorldPoint::new(4.0, 5.0, 6.0));
        b4.set_lane(2, &b);

        assert!(b4.extract(2) == b);
        assert!(b4.extract(0) == WorldBox::empty());
        assert!(b4.extract(3) == WorldBox::empty());
    }
}
