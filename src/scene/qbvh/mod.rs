mod binning;
mod building;
mod quad;
mod ray_bvh_intersection;
mod settings;
mod spatial_split;
mod statistics;

use index_vec::IndexVec;
use thiserror::Error;

use crate::{
    geometry::{Intersection, Ray, SIMD_LANES, WorldBox, WorldBox4},
    scene::{Primitive, PrimitiveRef, refine_all},
};

pub use quad::QuadGroup;
pub use ray_bvh_intersection::Hit;
pub use settings::{QbvhSettings, SettingsError, SplitMode};
pub use statistics::QbvhStatistics;

const NODE_CHILDREN: usize = 4;
const QUAD_SIZE: usize = SIMD_LANES;

/// Most primitive references a single leaf can hold.
pub const MAX_LEAF_PRIMITIVES: usize = QUAD_SIZE * CompressedNodeLink::MAX_COUNT as usize;
/// Builder recursion depth limit, deeper ranges are forced into leaves.
pub const MAX_DEPTH: u32 = 64;

const OBJECT_SPLIT_BINS: usize = 8;
const SPATIAL_SPLIT_BINS: usize = 64;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BuildError {
    #[error("Invalid settings: {0}")]
    InvalidSettings(#[from] SettingsError),
    #[error("Too many quad groups ({0}), leaf links can't address them")]
    TooManyQuads(usize),
    #[error("Too many nodes ({0}), inner links can't address them")]
    TooManyNodes(usize),
}

/// Counters of what happened while building.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub object_splits: usize,
    pub spatial_splits: usize,
    /// Leaves created because the recursion got too deep
    pub forced_leaves_depth: usize,
    /// Leaves created because no split could separate the primitives
    pub forced_leaves_degenerate: usize,
    /// References left out of oversized leaves
    pub dropped_references: usize,
    /// Spatial split references that ended up with nothing inside one of the child boxes
    pub clipped_out_references: usize,
    /// Primitives without triangle geometry, clipped by bounding box in spatial splits
    pub non_triangle_primitives: usize,
}

/// Four-wide bounding volume hierarchy over arbitrary primitives.
#[derive(Clone, Debug)]
pub struct Qbvh {
    world_bound: WorldBox,
    nodes: IndexVec<NodeIdx, Node>,
    quads: IndexVec<QuadIdx, QuadGroup>,
    primitive_count: usize,
    settings: QbvhSettings,
    report: BuildReport,
}

#[derive(Clone, Debug)]
struct Node {
    child_bounds: WorldBox4,
    child_links: [CompressedNodeLink; NODE_CHILDREN],
}

impl Default for Node {
    fn default() -> Self {
        Node {
            child_bounds: WorldBox4::empty(),
            child_links: [CompressedNodeLink::EMPTY; NODE_CHILDREN],
        }
    }
}

/// Packed child link.
/// Inner nodes are plain indices, leaves have the top bit set, followed by
/// 4 bits of quad count - 1 and 27 bits of offset of the first quad group.
/// All ones is an empty leaf.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq)]
struct CompressedNodeLink(u32);

#[derive(Clone, Debug, PartialEq, Eq)]
enum NodeLink {
    Empty,
    Inner { index: NodeIdx },
    Leaf { quads: QuadIdxRange },
}

impl CompressedNodeLink {
    const LEAF_FLAG: u32 = 1 << 31;
    const COUNT_SHIFT: u32 = 27;
    const COUNT_MASK: u32 = 0xf;
    const OFFSET_MASK: u32 = (1 << Self::COUNT_SHIFT) - 1;
    const EMPTY_VALUE: u32 = u32::MAX;

    pub const MAX_INNER_INDEX: u32 = Self::LEAF_FLAG - 1;
    /// A full leaf at the last offset would look like the empty leaf, so that one is not allowed
    pub const MAX_OFFSET: u32 = Self::OFFSET_MASK - 1;
    pub const MIN_COUNT: u32 = 1;
    pub const MAX_COUNT: u32 = Self::COUNT_MASK + 1;

    pub const EMPTY: Self = Self(Self::EMPTY_VALUE);
    pub const ROOT: Self = Self(0);

    /// Create a new leaf link, panics if offset or count are out of range
    fn new_leaf(first: QuadIdx, count: u32) -> Self {
        assert!(count >= Self::MIN_COUNT);
        assert!(count <= Self::MAX_COUNT);
        assert!(first.raw() <= Self::MAX_OFFSET);
        Self(Self::LEAF_FLAG | ((count - 1) << Self::COUNT_SHIFT) | first.raw())
    }

    /// Create a new inner node link, panics if index is out of range
    fn new_inner(index: NodeIdx) -> Self {
        assert!(index.raw() <= Self::MAX_INNER_INDEX);
        Self(index.raw())
    }

    fn decode(&self) -> NodeLink {
        if self.0 == Self::EMPTY_VALUE {
            NodeLink::Empty
        } else if self.0 & Self::LEAF_FLAG == 0 {
            NodeLink::Inner {
                index: NodeIdx::from_raw(self.0),
            }
        } else {
            let count = ((self.0 >> Self::COUNT_SHIFT) & Self::COUNT_MASK) + 1;
            let first = QuadIdx::from_raw(self.0 & Self::OFFSET_MASK);
            NodeLink::Leaf {
                quads: QuadIdxRange::new(first, count),
            }
        }
    }
}

impl Default for CompressedNodeLink {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl std::fmt::Debug for CompressedNodeLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeLink")
            .field("0", &format_args!("{:#010x}", self.0))
            .field("<decoded>", &self.decode())
            .finish()
    }
}

index_vec::define_index_type! {
    struct NodeIdx = u32;
    IMPL_RAW_CONVERSIONS = true;
}

index_vec::define_index_type! {
    struct QuadIdx = u32;
    MAX_INDEX = (CompressedNodeLink::MAX_OFFSET + CompressedNodeLink::MAX_COUNT) as usize;
    IMPL_RAW_CONVERSIONS = true;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct QuadIdxRange {
    pub first: QuadIdx,
    pub last: QuadIdx,
}

impl QuadIdxRange {
    pub fn new(first: QuadIdx, count: u32) -> QuadIdxRange {
        QuadIdxRange {
            first,
            last: first + (count as usize),
        }
    }

    pub fn len(&self) -> usize {
        self.last.index() - self.first.index()
    }

    pub fn iter(&self) -> impl Iterator<Item = QuadIdx> {
        (u32::from(self.first)..u32::from(self.last)).map(QuadIdx::from)
    }
}

impl Qbvh {
    /// Refines the primitives and builds the hierarchy over them.
    pub fn new(primitives: &[PrimitiveRef], settings: QbvhSettings) -> Result<Qbvh, BuildError> {
        settings.validate()?;
        let primitives = refine_all(primitives);

        let output = match settings.split_mode {
            SplitMode::Object => building::build_object_split(&primitives, &settings),
            SplitMode::Spatial => spatial_split::build_spatial_split(&primitives, &settings),
        };
        let (nodes, quads) = output.tree.pre_swizzle(&primitives)?;

        let bvh = Qbvh {
            world_bound: output.world_bound,
            nodes,
            quads,
            primitive_count: primitives.len(),
            settings,
            report: output.report,
        };
        bvh.log_statistics();

        Ok(bvh)
    }

    pub fn world_bound(&self) -> WorldBox {
        self.world_bound
    }

    /// Number of primitives after refinement, not counting duplicate references.
    pub fn primitive_count(&self) -> usize {
        self.primitive_count
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn quad_count(&self) -> usize {
        self.quads.len()
    }

    pub fn settings(&self) -> &QbvhSettings {
        &self.settings
    }

    pub fn build_report(&self) -> &BuildReport {
        &self.report
    }

    /// All primitive references in leaf storage order.
    /// Spatial splits may reference a primitive from several leaves.
    pub fn primitives(&self) -> Vec<PrimitiveRef> {
        self.quads
            .iter()
            .flat_map(|quad| quad.primitives().iter().cloned())
            .collect()
    }
}

impl Primitive for Qbvh {
    fn world_bound(&self) -> WorldBox {
        self.world_bound
    }

    fn intersect(&self, ray: &mut Ray) -> Option<Intersection> {
        Qbvh::intersect(self, ray).map(|hit| hit.intersection)
    }

    fn intersect_p(&self, ray: &Ray) -> bool {
        Qbvh::intersect_p(self, ray)
    }
}
