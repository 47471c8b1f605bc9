use arrayvec::ArrayVec;
use wide::CmpGe;

use super::{CompressedNodeLink, MAX_DEPTH, NODE_CHILDREN, NodeLink, Qbvh};
use crate::{
    geometry::{FloatType, Intersection, Ray, SimdRay},
    scene::PrimitiveRef,
    util::{mask_lanes, simd::SimdFloatExt as _},
};

/// Nodes are at most `MAX_DEPTH / 2 + 1` levels deep and every level leaves at most three
/// siblings on the stack.
const STACK_CAPACITY: usize = 128;
const _: () = assert!(STACK_CAPACITY >= (NODE_CHILDREN - 1) * (MAX_DEPTH as usize / 2 + 2) + 1);

/// Closest intersection found by `Qbvh::intersect`.
#[derive(Clone, Debug)]
pub struct Hit<'a> {
    pub intersection: Intersection,
    pub primitive: &'a PrimitiveRef,
}

impl Qbvh {
    /// Finds the closest primitive hit within the ray's [min_t, max_t] range.
    /// Shrinks the ray's `max_t` to the hit distance.
    pub fn intersect(&self, ray: &mut Ray) -> Option<Hit<'_>> {
        let simd_ray = SimdRay::from(&*ray);
        let mut stack = ArrayVec::<(CompressedNodeLink, FloatType), STACK_CAPACITY>::new();
        stack.push((CompressedNodeLink::ROOT, FloatType::NEG_INFINITY));

        let mut best = None;

        while let Some((link, entry_t)) = stack.pop() {
            if entry_t > ray.max_t {
                // Something closer was hit since this node was pushed
                continue;
            }

            match link.decode() {
                NodeLink::Empty => {}
                NodeLink::Inner { index } => {
                    let node = &self.nodes[index];
                    let (entry, exit) =
                        node.child_bounds
                            .entry_exit(&simd_ray, ray.min_t, ray.max_t);
                    let mask = exit.cmp_ge(entry).move_mask() as u32;

                    let mut children: ArrayVec<_, NODE_CHILDREN> = mask_lanes(mask)
                        .map(|child| (node.child_links[child], entry.lane(child)))
                        .collect();
                    // Nearest child ends up on top
                    children.sort_unstable_by(|a, b| b.1.total_cmp(&a.1));
                    stack.extend(children);
                }
                NodeLink::Leaf { quads } => {
                    for quad_index in quads.iter() {
                        let quad = &self.quads[quad_index];
                        if let Some((intersection, slot)) = quad.intersect(&simd_ray, ray) {
                            best = Some(Hit {
                                intersection,
                                primitive: quad.primitive(slot),
                            });
                        }
                    }
                }
            }
        }

        best
    }

    /// Checks whether anything is hit within the ray's [min_t, max_t] range.
    pub fn intersect_p(&self, ray: &Ray) -> bool {
        let simd_ray = SimdRay::from(ray);
        let mut stack = ArrayVec::<CompressedNodeLink, STACK_CAPACITY>::new();
        stack.push(CompressedNodeLink::ROOT);

        while let Some(link) = stack.pop() {
            match link.decode() {
                NodeLink::Empty => {}
                NodeLink::Inner { index } => {
                    let node = &self.nodes[index];
                    let mask = node
                        .child_bounds
                        .intersect(&simd_ray, ray.min_t, ray.max_t);
                    stack.extend(mask_lanes(mask).map(|child| node.child_links[child]));
                }
                NodeLink::Leaf { quads } => {
                    if quads
                        .iter()
                        .any(|quad| self.quads[quad].intersect_p(&simd_ray, ray))
                    {
                        return true;
                    }
                }
            }
        }

        false
    }
}
