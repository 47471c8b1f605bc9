use arrayvec::ArrayVec;
use index_vec::IndexVec;
use log::{debug, error, warn};

use super::{
    BuildError, BuildReport, CompressedNodeLink, MAX_DEPTH, MAX_LEAF_PRIMITIVES, NODE_CHILDREN,
    Node, NodeIdx, OBJECT_SPLIT_BINS, QUAD_SIZE, QbvhSettings, QuadGroup, QuadIdx,
    binning::{Bins, CentroidBinning},
};
use crate::{
    geometry::{FloatType, WorldBox, WorldPoint},
    scene::PrimitiveRef,
};

/// Child link of a node under construction.
/// Leaves point into the builder's list of primitive references.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildLink {
    Empty,
    Inner(NodeIdx),
    Leaf { start: usize, count: usize },
}

#[derive(Clone, Debug)]
pub struct BuildNode {
    pub bounds: [WorldBox; NODE_CHILDREN],
    pub links: [BuildLink; NODE_CHILDREN],
}

impl Default for BuildNode {
    fn default() -> Self {
        BuildNode {
            bounds: [WorldBox::empty(); NODE_CHILDREN],
            links: [BuildLink::Empty; NODE_CHILDREN],
        }
    }
}

/// Why a range of primitives became a leaf.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LeafReason {
    Small,
    DepthLimit,
    Degenerate,
}

/// Finished node hierarchy, before primitives are packed into quad groups.
#[derive(Clone, Debug)]
pub struct BuildTree {
    pub nodes: IndexVec<NodeIdx, BuildNode>,
    /// Indices into the primitive list, leaves own contiguous ranges
    pub references: Vec<usize>,
}

pub struct BuildOutput {
    pub tree: BuildTree,
    pub world_bound: WorldBox,
    pub report: BuildReport,
}

/// Node bookkeeping shared by both builders.
pub struct TreeBuilder {
    nodes: IndexVec<NodeIdx, BuildNode>,
    pub report: BuildReport,
    capacity: usize,
}

/// Node count of a perfectly balanced tree with full leaves.
fn initial_node_capacity(primitive_count: usize, max_prims_per_leaf: usize) -> usize {
    let mut layer = primitive_count
        .div_ceil(max_prims_per_leaf)
        .div_ceil(NODE_CHILDREN);
    let mut capacity = 1;
    while layer > 1 {
        capacity += layer;
        layer = layer.div_ceil(NODE_CHILDREN);
    }
    capacity
}

impl TreeBuilder {
    pub fn new(primitive_count: usize, max_prims_per_leaf: usize) -> TreeBuilder {
        let capacity = initial_node_capacity(primitive_count, max_prims_per_leaf);
        debug!("Building over {primitive_count} primitives, reserving {capacity} nodes");
        TreeBuilder {
            nodes: IndexVec::with_capacity(capacity),
            report: BuildReport::default(),
            capacity,
        }
    }

    fn create_intermediate_node(
        &mut self,
        parent: Option<NodeIdx>,
        child: usize,
        node_box: &WorldBox,
    ) -> NodeIdx {
        let index = self.nodes.push(BuildNode::default());
        if let Some(parent) = parent {
            let parent = &mut self.nodes[parent];
            parent.links[child] = BuildLink::Inner(index);
            parent.bounds[child] = *node_box;
        }
        index
    }

    /// Node and child slots that receive the two halves of a split.
    /// Splits at even depths open a new node, splits at odd depths are folded into their
    /// parent, so that every node gets four children out of two levels of binary splits.
    pub fn split_slots(
        &mut self,
        depth: u32,
        parent: Option<NodeIdx>,
        child: usize,
        node_box: &WorldBox,
    ) -> (NodeIdx, usize, usize) {
        match parent {
            Some(parent) if depth % 2 == 1 => (parent, child, child + 1),
            _ => (self.create_intermediate_node(parent, child, node_box), 0, 2),
        }
    }

    /// Number of references a new leaf keeps out of `count`.
    pub fn leaf_size(&mut self, count: usize, reason: LeafReason) -> usize {
        match reason {
            LeafReason::Small => {}
            LeafReason::DepthLimit => {
                warn!("Maximum build depth reached, forcing a leaf with {count} primitives");
                self.report.forced_leaves_depth += 1;
            }
            LeafReason::Degenerate => {
                debug!("Can't split {count} primitives, forcing a leaf");
                self.report.forced_leaves_degenerate += 1;
            }
        }

        if count > MAX_LEAF_PRIMITIVES {
            let dropped = count - MAX_LEAF_PRIMITIVES;
            error!(
                "Leaf with {count} primitives doesn't fit {MAX_LEAF_PRIMITIVES} slots, dropping {dropped} references"
            );
            self.report.dropped_references += dropped;
            MAX_LEAF_PRIMITIVES
        } else {
            count
        }
    }

    /// Links `count` references starting at `start` as a leaf.
    /// Without a parent the leaf becomes the only child of a new root node.
    pub fn create_temp_leaf(
        &mut self,
        parent: Option<NodeIdx>,
        child: usize,
        start: usize,
        count: usize,
        node_box: &WorldBox,
    ) {
        let (node, child) = match parent {
            Some(parent) => (parent, child),
            None => (self.create_intermediate_node(None, 0, node_box), 0),
        };
        let node = &mut self.nodes[node];
        node.links[child] = if count == 0 {
            BuildLink::Empty
        } else {
            BuildLink::Leaf { start, count }
        };
        node.bounds[child] = *node_box;
    }

    pub fn finish(self, references: Vec<usize>) -> (BuildTree, BuildReport) {
        debug!(
            "Build finished with {} nodes ({} reserved)",
            self.nodes.len(),
            self.capacity
        );
        (
            BuildTree {
                nodes: self.nodes,
                references,
            },
            self.report,
        )
    }
}

impl BuildTree {
    /// Packs the hierarchy into its final layout.
    /// Leaf primitives are copied into quad groups in depth first order.
    pub fn pre_swizzle(
        &self,
        primitives: &[PrimitiveRef],
    ) -> Result<(IndexVec<NodeIdx, Node>, IndexVec<QuadIdx, QuadGroup>), BuildError> {
        if self.nodes.len() > CompressedNodeLink::MAX_INNER_INDEX as usize + 1 {
            return Err(BuildError::TooManyNodes(self.nodes.len()));
        }

        let mut nodes: IndexVec<NodeIdx, Node> = self
            .nodes
            .iter()
            .map(|build_node| {
                let mut node = Node::default();
                for (i, b) in build_node.bounds.iter().enumerate() {
                    node.child_bounds.set_lane(i, b);
                }
                node
            })
            .collect();
        let mut quads = IndexVec::new();

        if !self.nodes.is_empty() {
            self.swizzle_recursive(NodeIdx::from_raw(0), primitives, &mut nodes, &mut quads)?;
        }

        Ok((nodes, quads))
    }

    fn swizzle_recursive(
        &self,
        index: NodeIdx,
        primitives: &[PrimitiveRef],
        nodes: &mut IndexVec<NodeIdx, Node>,
        quads: &mut IndexVec<QuadIdx, QuadGroup>,
    ) -> Result<(), BuildError> {
        for (child, link) in self.nodes[index].links.iter().enumerate() {
            nodes[index].child_links[child] = match *link {
                BuildLink::Empty => CompressedNodeLink::EMPTY,
                BuildLink::Inner(child_index) => {
                    self.swizzle_recursive(child_index, primitives, nodes, quads)?;
                    CompressedNodeLink::new_inner(child_index)
                }
                BuildLink::Leaf { start, count } => {
                    create_leaf(&self.references[start..start + count], primitives, quads)?
                }
            };
        }
        Ok(())
    }
}

fn create_leaf(
    references: &[usize],
    primitives: &[PrimitiveRef],
    quads: &mut IndexVec<QuadIdx, QuadGroup>,
) -> Result<CompressedNodeLink, BuildError> {
    let first = quads.len();
    if first > CompressedNodeLink::MAX_OFFSET as usize {
        return Err(BuildError::TooManyQuads(first));
    }

    for chunk in references.chunks(QUAD_SIZE) {
        let group: ArrayVec<PrimitiveRef, QUAD_SIZE> =
            chunk.iter().map(|&i| primitives[i].clone()).collect();
        quads.push(QuadGroup::new(&group));
    }

    let count = references.len().div_ceil(QUAD_SIZE);
    Ok(CompressedNodeLink::new_leaf(
        QuadIdx::from_usize(first),
        count as u32,
    ))
}

#[derive(Clone, Copy, Debug)]
struct ObjectSplit {
    axis: usize,
    position: FloatType,
}

/// Top down builder partitioning primitives by their centroids (QBVH).
struct ObjectSplitBuilder<'a> {
    settings: &'a QbvhSettings,
    primitive_bounds: Vec<WorldBox>,
    centroids: Vec<WorldPoint>,
    tree: TreeBuilder,
}

pub fn build_object_split(primitives: &[PrimitiveRef], settings: &QbvhSettings) -> BuildOutput {
    let primitive_bounds: Vec<WorldBox> = primitives
        .iter()
        .map(|p| p.world_bound().expanded_by_epsilon())
        .collect();
    let centroids: Vec<WorldPoint> = primitive_bounds.iter().map(WorldBox::center).collect();
    let world_bound = primitive_bounds
        .iter()
        .fold(WorldBox::empty(), |acc, b| acc.union(b));
    let centroid_bounds = WorldBox::from_points(&centroids);

    let mut builder = ObjectSplitBuilder {
        settings,
        primitive_bounds,
        centroids,
        tree: TreeBuilder::new(primitives.len(), settings.max_prims_per_leaf),
    };
    let mut references: Vec<usize> = (0..primitives.len()).collect();
    builder.build_recursive(
        0,
        &mut references,
        &world_bound,
        &centroid_bounds,
        None,
        0,
        0,
    );

    let (tree, report) = builder.tree.finish(references);
    BuildOutput {
        tree,
        world_bound,
        report,
    }
}

impl ObjectSplitBuilder<'_> {
    /// Builds the subtree over `references`, which start at `offset` in the full list.
    #[allow(clippy::too_many_arguments)]
    fn build_recursive(
        &mut self,
        offset: usize,
        references: &mut [usize],
        node_box: &WorldBox,
        centroid_box: &WorldBox,
        parent: Option<NodeIdx>,
        child: usize,
        depth: u32,
    ) {
        let count = references.len();
        let leaf_reason = if depth > MAX_DEPTH {
            Some(LeafReason::DepthLimit)
        } else if count <= self.settings.max_prims_per_leaf {
            Some(LeafReason::Small)
        } else {
            None
        };
        let split = match leaf_reason {
            Some(reason) => Err(reason),
            None => self
                .find_split(references, centroid_box)
                .ok_or(LeafReason::Degenerate),
        };
        let split = match split {
            Ok(split) => split,
            Err(reason) => {
                let count = self.tree.leaf_size(count, reason);
                self.tree
                    .create_temp_leaf(parent, child, offset, count, node_box);
                return;
            }
        };

        let mut left_count = 0;
        let mut left_box = WorldBox::empty();
        let mut left_centroids = WorldBox::empty();
        let mut right_box = WorldBox::empty();
        let mut right_centroids = WorldBox::empty();
        for i in 0..count {
            let primitive = references[i];
            let centroid = &self.centroids[primitive];
            if centroid[split.axis] <= split.position {
                references.swap(i, left_count);
                left_count += 1;
                left_box = left_box.union(&self.primitive_bounds[primitive]);
                left_centroids = left_centroids.union_point(centroid);
            } else {
                right_box = right_box.union(&self.primitive_bounds[primitive]);
                right_centroids = right_centroids.union_point(centroid);
            }
        }

        self.tree.report.object_splits += 1;
        let (node, left_child, right_child) =
            self.tree.split_slots(depth, parent, child, node_box);

        let (left, right) = references.split_at_mut(left_count);
        self.build_recursive(
            offset,
            left,
            &left_box,
            &left_centroids,
            Some(node),
            left_child,
            depth + 1,
        );
        self.build_recursive(
            offset + left_count,
            right,
            &right_box,
            &right_centroids,
            Some(node),
            right_child,
            depth + 1,
        );
    }

    fn find_split(&self, references: &[usize], centroid_box: &WorldBox) -> Option<ObjectSplit> {
        let binning = CentroidBinning::<OBJECT_SPLIT_BINS>::new(centroid_box)?;
        let step = if references.len() < self.settings.full_sweep_threshold {
            1
        } else {
            self.settings.skip_factor
        };

        let mut candidate = self.bin(references, &binning, step).best_split(false);
        if candidate.is_none() && step > 1 {
            // The sample can miss a separation that the full set has
            candidate = self.bin(references, &binning, 1).best_split(false);
        }

        candidate.map(|c| ObjectSplit {
            axis: binning.axis,
            position: binning.split_position(c.bin),
        })
    }

    fn bin(
        &self,
        references: &[usize],
        binning: &CentroidBinning<OBJECT_SPLIT_BINS>,
        step: usize,
    ) -> Bins<OBJECT_SPLIT_BINS> {
        let mut bins = Bins::new();
        for &primitive in references.iter().step_by(step) {
            bins.add(
                binning.bin(&self.centroids[primitive]),
                &self.primitive_bounds[primitive],
            );
        }
        bins
    }
}
