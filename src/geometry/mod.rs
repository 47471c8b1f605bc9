mod aabb;
mod ray_box_intersection;
mod ray_triangle_intersection;
mod triangle;

pub use aabb::{AABB, ClippedPolygon};
pub use ray_triangle_intersection::Triangle4;
pub use triangle::{BarycentricCoordinates, Triangle, default_texture_coords};

use nalgebra::{Point2, Point3, Unit, Vector3};
use wide::f32x4;

use crate::util::simd::{splat_point, splat_vector};

pub type FloatType = f32;
pub type SimdFloatType = f32x4;
pub const SIMD_LANES: usize = 4;

pub type WorldPoint = Point3<FloatType>;
pub type WorldVector = Vector3<FloatType>;
pub type WorldBox = AABB<WorldPoint>;
pub type TexturePoint = Point2<FloatType>;

pub type WorldPoint4 = Point3<SimdFloatType>;
pub type WorldVector4 = Vector3<SimdFloatType>;
pub type WorldBox4 = AABB<WorldPoint4>;

const EPSILON_MIN: FloatType = 1e-9;
const EPSILON_MAX: FloatType = 1e-1;
const EPSILON_ULPS: FloatType = 128.0;

/// Absolute error tolerance for a coordinate of the given magnitude.
/// Scales with the value, clamped to a sane range so that both tiny and huge scenes work.
pub fn machine_epsilon(value: FloatType) -> FloatType {
    (value.abs() * FloatType::EPSILON * EPSILON_ULPS).clamp(EPSILON_MIN, EPSILON_MAX)
}

#[derive(Copy, Clone, Debug)]
pub struct Ray {
    pub origin: WorldPoint,
    /// Normalized direction of the ray
    pub direction: WorldVector,

    /// Componentwise inverse of the ray direction
    /// Zeros in direction get turned into positive infinity regardless of the sign of the zero
    pub inv_direction: WorldVector,

    /// Hits closer than this are ignored
    pub min_t: FloatType,
    /// Hits farther than this are ignored, shrinks as closer hits are found
    pub max_t: FloatType,
}

impl Ray {
    pub fn new(origin: WorldPoint, direction: WorldVector) -> Ray {
        Ray::with_range(origin, direction, 0.0, FloatType::INFINITY)
    }

    pub fn with_range(
        origin: WorldPoint,
        direction: WorldVector,
        min_t: FloatType,
        max_t: FloatType,
    ) -> Ray {
        let direction = direction.normalize();
        let inv_direction = direction.map(|x| if x == 0.0 { f32::INFINITY } else { 1.0 / x });

        Ray {
            origin,
            direction,
            inv_direction,
            min_t,
            max_t,
        }
    }

    pub fn point_at(&self, distance: FloatType) -> WorldPoint {
        self.origin + self.direction * distance
    }

    /// 1 for axes where the ray goes in the negative direction, 0 otherwise.
    pub fn direction_signs(&self) -> [usize; 3] {
        std::array::from_fn(|i| usize::from(self.inv_direction[i] < 0.0))
    }
}

/// Ray data splatted to all SIMD lanes, prepared once per traversal.
#[derive(Copy, Clone, Debug)]
pub struct SimdRay {
    pub origin: WorldPoint4,
    pub direction: WorldVector4,
    pub inv_direction: WorldVector4,
    pub signs: [usize; 3],
}

impl From<&Ray> for SimdRay {
    fn from(ray: &Ray) -> Self {
        SimdRay {
            origin: splat_point(&ray.origin),
            direction: splat_vector(&ray.direction),
            inv_direction: splat_vector(&ray.inv_direction),
            signs: ray.direction_signs(),
        }
    }
}

/// Everything known about a ray hit on a primitive surface.
#[derive(Clone, Debug, PartialEq)]
pub struct Intersection {
    /// Distance along the ray
    pub t: FloatType,
    pub point: WorldPoint,
    /// Geometric normal
    pub normal: Unit<WorldVector>,
    pub dpdu: WorldVector,
    pub dpdv: WorldVector,
    pub texture_coords: TexturePoint,
    /// Barycentric coordinates of the hit for triangles, zero for other shapes
    pub uv: BarycentricCoordinates<FloatType>,
}

/// Builds two vectors orthogonal to `v` and to each other.
pub fn coordinate_system(v: &WorldVector) -> (WorldVector, WorldVector) {
    let v2 = if v.x.abs() > v.y.abs() {
        let inv_len = 1.0 / (v.x * v.x + v.z * v.z).sqrt();
        WorldVector::new(-v.z * inv_len, 0.0, v.x * inv_len)
    } else {
        let inv_len = 1.0 / (v.y * v.y + v.z * v.z).sqrt();
        WorldVector::new(0.0, v.z * inv_len, -v.y * inv_len)
    };
    let v3 = v.cross(&v2);
    (v2, v3)
}
