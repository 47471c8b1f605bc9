use std::{fs, path::Path};

use indexmap::IndexMap;
use log::{debug, warn};
use thiserror::Error;

use crate::geometry::{TexturePoint, Triangle, WorldPoint};

use super::primitives::TriangleMesh;

#[derive(Error, Debug)]
pub enum ObjOpenError {
    #[error("Failed to read file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse OBJ: {0}")]
    ParseError(#[from] wavefront_obj::ParseError),
}

struct VertexData {
    pos: WorldPoint,
    tex: Option<TexturePoint>,
}

impl TriangleMesh {
    /// Loads all triangles of a wavefront OBJ file as a single mesh.
    pub fn with_obj(p: impl AsRef<Path>) -> Result<TriangleMesh, ObjOpenError> {
        let content = fs::read_to_string(p)?;
        Self::parse_obj(content)
    }

    pub fn parse_obj(content: impl AsRef<str>) -> Result<TriangleMesh, ObjOpenError> {
        let parsed = wavefront_obj::obj::parse(content.as_ref())?;
        Ok(Self::load_obj(parsed))
    }

    fn load_obj(obj: wavefront_obj::obj::ObjSet) -> TriangleMesh {
        let mut triangles = Vec::new();
        let mut vertices = IndexMap::new();
        let mut skipped = 0usize;

        for (object_index, o) in obj.objects.into_iter().enumerate() {
            for geometry in o.geometry {
                for shape in geometry.shapes {
                    let wavefront_obj::obj::Primitive::Triangle(a, b, c) = shape.primitive else {
                        skipped += 1;
                        continue;
                    };

                    // Indices are local to each object
                    let mut handle_vertex = |vtindex: (usize, Option<usize>, Option<usize>)| {
                        let entry = vertices.entry((object_index, vtindex.0, vtindex.1));
                        let index = entry.index();
                        entry.or_insert_with(|| {
                            let vertex = &o.vertices[vtindex.0];
                            let tex_vertex = vtindex.1.map(|i| &o.tex_vertices[i]);
                            VertexData {
                                pos: WorldPoint::new(
                                    vertex.x as f32,
                                    vertex.y as f32,
                                    vertex.z as f32,
                                ),
                                tex: tex_vertex.map(|v| TexturePoint::new(v.u as f32, v.v as f32)),
                            }
                        });
                        index
                    };

                    let a = handle_vertex(a);
                    let b = handle_vertex(b);
                    let c = handle_vertex(c);

                    triangles.push(Triangle::new(a, b, c));
                }
            }
        }

        if skipped > 0 {
            warn!("Skipped {skipped} non-triangle OBJ primitives");
        }
        debug!(
            "Loaded OBJ mesh with {} triangles, {} vertices",
            triangles.len(),
            vertices.len()
        );

        let vertices: Vec<VertexData> = vertices.into_values().collect();
        let positions = vertices.iter().map(|v| v.pos).collect();

        if vertices.iter().all(|v| v.tex.is_some()) && !vertices.is_empty() {
            let texture_coords = vertices
                .iter()
                .map(|v| v.tex.unwrap_or_else(TexturePoint::origin))
                .collect();
            TriangleMesh::with_texture_coords(positions, texture_coords, triangles)
        } else {
            TriangleMesh::new(positions, triangles)
        }
    }
}
