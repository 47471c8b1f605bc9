use log::{debug, info};

use super::{
    MAX_DEPTH, NodeIdx, OBJECT_SPLIT_BINS, QbvhSettings, SPATIAL_SPLIT_BINS,
    binning::{Bins, CentroidBinning, SplitCandidate, child_cost},
    building::{BuildOutput, LeafReason, TreeBuilder},
};
use crate::{
    geometry::{FloatType, Triangle, WorldBox, WorldPoint},
    scene::PrimitiveRef,
};

/// Part of a primitive assigned to a subtree.
#[derive(Clone, Copy, Debug)]
struct Reference {
    primitive: usize,
    bounds: WorldBox,
}

struct ObjectSplit {
    binning: CentroidBinning<OBJECT_SPLIT_BINS>,
    candidate: SplitCandidate,
}

struct SpatialSplit {
    axis: usize,
    position: FloatType,
    left_bounds: WorldBox,
    right_bounds: WorldBox,
    cost: FloatType,
}

/// Children produced by a split, references with the bounds of their subtree.
type Partition = (Vec<Reference>, WorldBox, Vec<Reference>, WorldBox);

/// Builder that may split primitives between children when that makes them tighter (SQBVH).
struct SpatialSplitBuilder<'a> {
    settings: &'a QbvhSettings,
    /// Triangle geometry of each primitive, used for exact clipping
    vertices: Vec<Option<Triangle<WorldPoint>>>,
    world_area: FloatType,
    tree: TreeBuilder,
    /// Leaf references, primitives can appear more than once
    references: Vec<usize>,
}

pub fn build_spatial_split(primitives: &[PrimitiveRef], settings: &QbvhSettings) -> BuildOutput {
    let (references, world_bound) = initial_references(primitives);
    let mut builder = SpatialSplitBuilder::new(primitives, settings, &world_bound);
    builder.build_recursive(references, &world_bound, None, 0, 0);

    let SpatialSplitBuilder {
        tree, references, ..
    } = builder;
    let (tree, report) = tree.finish(references);
    BuildOutput {
        tree,
        world_bound,
        report,
    }
}

/// One reference per primitive, and the expanded bounds of all of them.
fn initial_references(primitives: &[PrimitiveRef]) -> (Vec<Reference>, WorldBox) {
    let references: Vec<Reference> = primitives
        .iter()
        .enumerate()
        .map(|(primitive, p)| Reference {
            primitive,
            bounds: p.world_bound(),
        })
        .collect();
    let world_bound = bounds_of(&references).expanded_by_epsilon();
    (references, world_bound)
}

fn bounds_of(references: &[Reference]) -> WorldBox {
    references
        .iter()
        .fold(WorldBox::empty(), |acc, r| acc.union(&r.bounds))
}

impl<'a> SpatialSplitBuilder<'a> {
    fn new(
        primitives: &[PrimitiveRef],
        settings: &'a QbvhSettings,
        world_bound: &WorldBox,
    ) -> SpatialSplitBuilder<'a> {
        let vertices: Vec<Option<Triangle<WorldPoint>>> =
            primitives.iter().map(|p| p.triangle_vertices()).collect();
        let non_triangles = vertices.iter().filter(|v| v.is_none()).count();
        if non_triangles > 0 {
            info!("{non_triangles} primitives are not triangles, spatial splits clip their bounding boxes");
        }

        let mut tree = TreeBuilder::new(primitives.len(), settings.max_prims_per_leaf);
        tree.report.non_triangle_primitives = non_triangles;
        SpatialSplitBuilder {
            settings,
            vertices,
            world_area: world_bound.surface_area(),
            tree,
            references: Vec::with_capacity(primitives.len()),
        }
    }

    fn build_recursive(
        &mut self,
        references: Vec<Reference>,
        node_box: &WorldBox,
        parent: Option<NodeIdx>,
        child: usize,
        depth: u32,
    ) {
        if depth > MAX_DEPTH {
            return self.create_leaf(&references, LeafReason::DepthLimit, node_box, parent, child);
        }
        if references.len() <= self.settings.max_prims_per_leaf {
            return self.create_leaf(&references, LeafReason::Small, node_box, parent, child);
        }
        let Some(object_split) = self.find_object_split(&references) else {
            return self.create_leaf(&references, LeafReason::Degenerate, node_box, parent, child);
        };

        let left_bounds = object_split.candidate.left_bounds.expanded_by_epsilon();
        let right_bounds = object_split.candidate.right_bounds.expanded_by_epsilon();
        let object_cost = child_cost(&left_bounds, object_split.candidate.left_count)
            + child_cost(&right_bounds, object_split.candidate.right_count);

        let spatial_split = self.cheaper_spatial_split(
            &references,
            node_box,
            &left_bounds,
            &right_bounds,
            object_cost,
        );

        let (left, left_box, right, right_box) = match spatial_split {
            Some(split) => {
                self.tree.report.spatial_splits += 1;
                self.do_spatial_split(references, &split)
            }
            None => {
                self.tree.report.object_splits += 1;
                do_object_split(references, &object_split)
            }
        };

        let (node, left_child, right_child) =
            self.tree.split_slots(depth, parent, child, node_box);
        self.build_recursive(left, &left_box, Some(node), left_child, depth + 1);
        self.build_recursive(right, &right_box, Some(node), right_child, depth + 1);
    }

    fn create_leaf(
        &mut self,
        references: &[Reference],
        reason: LeafReason,
        node_box: &WorldBox,
        parent: Option<NodeIdx>,
        child: usize,
    ) {
        let count = self.tree.leaf_size(references.len(), reason);
        let start = self.references.len();
        self.references
            .extend(references[..count].iter().map(|r| r.primitive));
        self.tree
            .create_temp_leaf(parent, child, start, count, node_box);
    }

    /// Spatial split to use instead of an object split with the given children and cost.
    /// Only tried when the object split children overlap by more than `alpha` of the scene.
    fn cheaper_spatial_split(
        &self,
        references: &[Reference],
        node_box: &WorldBox,
        left_bounds: &WorldBox,
        right_bounds: &WorldBox,
        object_cost: FloatType,
    ) -> Option<SpatialSplit> {
        let overlap = left_bounds.intersection(right_bounds)?;
        if !(overlap.surface_area() > self.settings.alpha * self.world_area) {
            return None;
        }
        self.find_spatial_split(references, node_box)
            .filter(|split| split.cost < object_cost)
    }

    fn find_object_split(&self, references: &[Reference]) -> Option<ObjectSplit> {
        let centroid_bounds = references
            .iter()
            .fold(WorldBox::empty(), |acc, r| acc.union_point(&r.bounds.center()));
        let binning = CentroidBinning::<OBJECT_SPLIT_BINS>::new(&centroid_bounds)?;

        let bin = |step: usize| {
            let mut bins = Bins::<OBJECT_SPLIT_BINS>::new();
            for r in references.iter().step_by(step) {
                bins.add(binning.bin(&r.bounds.center()), &r.bounds);
            }
            bins.best_split(false)
        };
        let step = if references.len() < self.settings.full_sweep_threshold {
            1
        } else {
            self.settings.skip_factor
        };
        let candidate = match bin(step) {
            Some(candidate) => candidate,
            None if step > 1 => bin(1)?,
            None => return None,
        };

        Some(ObjectSplit { binning, candidate })
    }

    /// Bins references by the part of their geometry inside each slab of the node box.
    fn find_spatial_split(&self, references: &[Reference], node_box: &WorldBox) -> Option<SpatialSplit> {
        const N: usize = SPATIAL_SPLIT_BINS;

        let axis = node_box.maximum_extent();
        let k0 = node_box.min[axis];
        let bin_width = (node_box.max[axis] - k0) / N as FloatType;
        if !(bin_width >= 10.0 * node_box.machine_epsilon()) {
            return None;
        }

        let bin_max = |bin: usize| {
            if bin == N - 1 {
                node_box.max[axis]
            } else {
                k0 + bin_width * (bin + 1) as FloatType
            }
        };
        let bin_box = |bin: usize| {
            let mut b = *node_box;
            if bin > 0 {
                b.min[axis] = bin_max(bin - 1);
            }
            b.max[axis] = bin_max(bin);
            b
        };

        let mut bins = Bins::<N>::new();
        for r in references {
            let entry = (0..N)
                .find(|&bin| r.bounds.min[axis] <= bin_max(bin))
                .unwrap_or(N - 1);
            let exit = (entry..N)
                .find(|&bin| r.bounds.max[axis] <= bin_max(bin))
                .unwrap_or(N - 1);
            bins.entries[entry] += 1;
            bins.exits[exit] += 1;

            for bin in entry..=exit {
                if let Some(clipped) = self.clip_reference(r, &bin_box(bin), axis) {
                    bins.bounds[bin] = bins.bounds[bin].union(&clipped);
                }
            }
        }

        let count = references.len();
        let mut best: Option<SplitCandidate> = None;
        for candidate in bins.candidates(true) {
            // A split keeping everything on one side would never terminate
            if candidate.left_count == count || candidate.right_count == count {
                continue;
            }
            if best.is_none_or(|b| candidate.cost < b.cost) {
                best = Some(candidate);
            }
        }
        let best = best?;

        let left_bounds = best.left_bounds.expanded_by_epsilon();
        let right_bounds = best.right_bounds.expanded_by_epsilon();
        Some(SpatialSplit {
            axis,
            position: k0 + bin_width * (best.bin + 1) as FloatType,
            cost: child_cost(&left_bounds, best.left_count)
                + child_cost(&right_bounds, best.right_count),
            left_bounds,
            right_bounds,
        })
    }

    /// Bounds of the part of a reference inside `clip_box`.
    /// Triangles are clipped exactly, other primitives only have their box cut along `axis`.
    fn clip_reference(&self, reference: &Reference, clip_box: &WorldBox, axis: usize) -> Option<WorldBox> {
        match &self.vertices[reference.primitive] {
            Some(triangle) => {
                WorldBox::from_points(clip_box.clip_polygon(triangle).iter())
                    .intersection(&reference.bounds)
            }
            None => {
                let mut clipped = reference.bounds;
                clipped.min[axis] = clipped.min[axis].max(clip_box.min[axis]);
                clipped.max[axis] = clipped.max[axis].min(clip_box.max[axis]);
                clipped.is_valid().then_some(clipped)
            }
        }
    }

    /// Reference bounds limited to one side of the split plane and to the child box.
    fn clip_to_child(
        &self,
        reference: &Reference,
        split: &SpatialSplit,
        child_bounds: &WorldBox,
        left: bool,
    ) -> Option<Reference> {
        let clipped = self
            .clip_reference(reference, &child_bounds.expanded_by_epsilon(), split.axis)
            .or_else(|| {
                // Clipping the geometry can fail numerically for slivers touching the plane
                let mut clamped = reference.bounds;
                if left {
                    clamped.max[split.axis] = clamped.max[split.axis].min(split.position);
                } else {
                    clamped.min[split.axis] = clamped.min[split.axis].max(split.position);
                }
                clamped.is_valid().then_some(clamped)
            })?
            .intersection(child_bounds)?;

        Some(Reference {
            primitive: reference.primitive,
            bounds: clipped,
        })
    }

    fn do_spatial_split(&mut self, references: Vec<Reference>, split: &SpatialSplit) -> Partition {
        let mut left = Vec::new();
        let mut right = Vec::new();

        for r in &references {
            let sides = [
                (r.bounds.min[split.axis] <= split.position, &split.left_bounds, true, &mut left),
                (r.bounds.max[split.axis] > split.position, &split.right_bounds, false, &mut right),
            ];
            for (overlaps, child_bounds, is_left, side) in sides {
                if !overlaps {
                    continue;
                }
                match self.clip_to_child(r, split, child_bounds, is_left) {
                    Some(clipped) => side.push(clipped),
                    None => {
                        debug!(
                            "Primitive {} has nothing inside the {} child box, leaving it out",
                            r.primitive,
                            if is_left { "left" } else { "right" }
                        );
                        self.tree.report.clipped_out_references += 1;
                    }
                }
            }
        }

        assert2::debug_assert!(left.iter().all(|r| split.left_bounds.contains_box(&r.bounds)));
        assert2::debug_assert!(right.iter().all(|r| split.right_bounds.contains_box(&r.bounds)));

        (left, split.left_bounds, right, split.right_bounds)
    }
}

fn do_object_split(references: Vec<Reference>, split: &ObjectSplit) -> Partition {
    let (left, right): (Vec<Reference>, Vec<Reference>) = references
        .into_iter()
        .partition(|r| split.binning.bin(&r.bounds.center()) <= split.candidate.bin);
    let left_box = bounds_of(&left).expanded_by_epsilon();
    let right_box = bounds_of(&right).expanded_by_epsilon();
    (left, left_box, right, right_box)
}
