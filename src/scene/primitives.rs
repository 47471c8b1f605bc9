use std::{f32::consts::PI, sync::Arc};

use nalgebra::Unit;

use crate::geometry::{
    BarycentricCoordinates, FloatType, Intersection, Ray, TexturePoint, Triangle, WorldBox,
    WorldPoint, WorldVector, default_texture_coords,
};

use super::{Primitive, PrimitiveRef};

#[derive(Clone, Debug)]
pub struct Sphere {
    pub center: WorldPoint,
    pub radius: FloatType,
}

impl Sphere {
    /// Distance to the first intersection within the ray's range.
    /// Expects normalized ray direction.
    fn hit_distance(&self, ray: &Ray) -> Option<FloatType> {
        let oc = ray.origin - self.center;
        let b = oc.dot(&ray.direction);
        let c = oc.dot(&oc) - self.radius * self.radius;
        let discriminant = b * b - c;

        if discriminant < 0.0 {
            return None;
        }

        let sqrt_disc = discriminant.sqrt();
        [-b - sqrt_disc, -b + sqrt_disc]
            .into_iter()
            .find(|t| *t > ray.min_t && *t < ray.max_t)
    }
}

impl Primitive for Sphere {
    fn world_bound(&self) -> WorldBox {
        let r_vec = WorldVector::repeat(self.radius);
        WorldBox {
            min: self.center - r_vec,
            max: self.center + r_vec,
        }
    }

    fn intersect(&self, ray: &mut Ray) -> Option<Intersection> {
        let t = self.hit_distance(ray)?;
        ray.max_t = t;

        let point = ray.point_at(t);
        let local = point - self.center;
        let normal = Unit::new_normalize(local);

        let phi = local.y.atan2(local.x).rem_euclid(2.0 * PI);
        let theta = (local.z / self.radius).clamp(-1.0, 1.0).acos();
        let (sin_phi, cos_phi) = phi.sin_cos();

        Some(Intersection {
            t,
            point,
            normal,
            dpdu: WorldVector::new(-2.0 * PI * local.y, 2.0 * PI * local.x, 0.0),
            dpdv: WorldVector::new(
                local.z * cos_phi,
                local.z * sin_phi,
                -self.radius * theta.sin(),
            ) * PI,
            texture_coords: TexturePoint::new(phi / (2.0 * PI), theta / PI),
            uv: BarycentricCoordinates::default(),
        })
    }

    fn intersect_p(&self, ray: &Ray) -> bool {
        self.hit_distance(ray).is_some()
    }
}

#[derive(Debug)]
struct MeshData {
    positions: Vec<WorldPoint>,
    texture_coords: Option<Vec<TexturePoint>>,
    triangles: Vec<Triangle<usize>>,
}

/// Indexed triangle mesh.
/// Not intersectable by itself, gets refined into individual `MeshTriangle`s.
#[derive(Clone, Debug)]
pub struct TriangleMesh {
    data: Arc<MeshData>,
}

impl TriangleMesh {
    pub fn new(positions: Vec<WorldPoint>, triangles: Vec<Triangle<usize>>) -> TriangleMesh {
        TriangleMesh {
            data: Arc::new(MeshData {
                positions,
                texture_coords: None,
                triangles,
            }),
        }
    }

    /// Mesh with per-vertex texture coordinates, `texture_coords` must be as long as `positions`.
    pub fn with_texture_coords(
        positions: Vec<WorldPoint>,
        texture_coords: Vec<TexturePoint>,
        triangles: Vec<Triangle<usize>>,
    ) -> TriangleMesh {
        assert!(texture_coords.len() == positions.len());
        TriangleMesh {
            data: Arc::new(MeshData {
                positions,
                texture_coords: Some(texture_coords),
                triangles,
            }),
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.data.triangles.len()
    }

    pub fn triangles(&self) -> impl Iterator<Item = MeshTriangle> + '_ {
        (0..self.triangle_count()).map(|index| MeshTriangle {
            mesh: self.data.clone(),
            index,
        })
    }
}

impl Primitive for TriangleMesh {
    fn world_bound(&self) -> WorldBox {
        WorldBox::from_points(&self.data.positions)
    }

    fn can_intersect(&self) -> bool {
        false
    }

    fn refine(&self, refined: &mut Vec<PrimitiveRef>) {
        refined.extend(self.triangles().map(|t| Arc::new(t) as PrimitiveRef));
    }

    /// Brute force over all triangles, meshes are meant to be refined and put in an accelerator.
    fn intersect(&self, ray: &mut Ray) -> Option<Intersection> {
        let mut ret = None;
        for triangle in self.triangles() {
            if let Some(isect) = triangle.intersect(ray) {
                ret = Some(isect);
            }
        }
        ret
    }

    fn intersect_p(&self, ray: &Ray) -> bool {
        self.triangles().any(|t| t.intersect_p(ray))
    }
}

/// Single triangle of a `TriangleMesh`.
#[derive(Clone, Debug)]
pub struct MeshTriangle {
    mesh: Arc<MeshData>,
    index: usize,
}

impl MeshTriangle {
    pub fn vertices(&self) -> Triangle<WorldPoint> {
        self.mesh.triangles[self.index].map(|i| self.mesh.positions[*i])
    }

    pub fn texture_coords(&self) -> Triangle<TexturePoint> {
        match &self.mesh.texture_coords {
            Some(texture_coords) => self.mesh.triangles[self.index].map(|i| texture_coords[*i]),
            None => default_texture_coords(),
        }
    }
}

impl Primitive for MeshTriangle {
    fn world_bound(&self) -> WorldBox {
        WorldBox::from_points(self.vertices().iter())
    }

    fn intersect(&self, ray: &mut Ray) -> Option<Intersection> {
        let vertices = self.vertices();
        let (t, uv) = vertices.intersect(ray)?;
        ray.max_t = t;
        Some(Intersection::from_triangle_hit(
            t,
            uv,
            &vertices[0],
            &vertices.edges(),
            &self.texture_coords(),
        ))
    }

    fn intersect_p(&self, ray: &Ray) -> bool {
        self.vertices().intersect(ray).is_some()
    }

    fn triangle_vertices(&self) -> Option<Triangle<WorldPoint>> {
        Some(self.vertices())
    }

    fn triangle_texture_coords(&self) -> Triangle<TexturePoint> {
        self.texture_coords()
    }
}
