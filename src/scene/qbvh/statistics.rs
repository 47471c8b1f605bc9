use std::fmt;

use log::{Level, debug, log_enabled};

use super::{CompressedNodeLink, NodeIdx, NodeLink, QUAD_SIZE, Qbvh};
use crate::{
    geometry::{FloatType, WorldBox},
    util::Stats,
};

/// Shape and quality measures of a built hierarchy.
#[derive(Clone, Debug)]
pub struct QbvhStatistics {
    /// Expected traversal cost, one per node visit and one per primitive test
    pub sah_cost: FloatType,
    pub max_depth: usize,
    pub node_count: usize,
    pub empty_leaf_count: usize,
    pub non_empty_leaf_count: usize,
    /// Primitive slots referenced by leaves, not counting padding
    pub primitive_references: usize,
    pub primitive_count: usize,
    pub avg_leaf_primitive_references: FloatType,
    /// Primitive references per non-empty leaf
    pub leaf_fill: Stats,
    /// Depth of the nodes holding non-empty leaves
    pub leaf_depth: Stats,
}

impl Qbvh {
    pub fn statistics(&self) -> QbvhStatistics {
        let mut stats = QbvhStatistics {
            sah_cost: 0.0,
            max_depth: 0,
            node_count: 0,
            empty_leaf_count: 0,
            non_empty_leaf_count: 0,
            primitive_references: 0,
            primitive_count: self.primitive_count,
            avg_leaf_primitive_references: 0.0,
            leaf_fill: Stats::default(),
            leaf_depth: Stats::default(),
        };

        stats.sah_cost =
            self.collect_statistics(NodeIdx::from_raw(0), &self.world_bound, 0, &mut stats);
        if stats.non_empty_leaf_count > 0 {
            stats.avg_leaf_primitive_references =
                stats.primitive_references as FloatType / stats.non_empty_leaf_count as FloatType;
        }

        stats
    }

    /// Returns SAH cost of the subtree.
    fn collect_statistics(
        &self,
        index: NodeIdx,
        node_box: &WorldBox,
        depth: usize,
        stats: &mut QbvhStatistics,
    ) -> FloatType {
        stats.node_count += 1;
        stats.max_depth = stats.max_depth.max(depth);

        let node = &self.nodes[index];
        let node_area = node_box.surface_area();
        let mut cost = 1.0;

        for (child, link) in node.child_links.iter().enumerate() {
            let child_box = node.child_bounds.extract(child);
            let probability = if node_area > 0.0 {
                child_box.surface_area() / node_area
            } else {
                1.0
            };

            match link.decode() {
                NodeLink::Empty => stats.empty_leaf_count += 1,
                NodeLink::Inner { index } => {
                    cost += probability * self.collect_statistics(index, &child_box, depth + 1, stats);
                }
                NodeLink::Leaf { quads } => {
                    let references: usize = quads.iter().map(|q| self.quads[q].len()).sum();
                    stats.non_empty_leaf_count += 1;
                    stats.primitive_references += references;
                    stats.leaf_fill.add_sample(references);
                    stats.leaf_depth.add_sample(depth);
                    cost += probability * (QUAD_SIZE * quads.len()) as FloatType;
                }
            }
        }

        cost
    }

    pub fn log_statistics(&self) {
        if !log_enabled!(Level::Debug) {
            return;
        }

        let mode = self.settings.split_mode;
        let stats = self.statistics();
        debug!("{mode} SAH cost: {:.3}", stats.sah_cost);
        debug!("{mode} max depth: {}", stats.max_depth);
        debug!("{mode} nodes: {}", stats.node_count);
        debug!("{mode} empty leaves: {}", stats.empty_leaf_count);
        debug!("{mode} non-empty leaves: {}", stats.non_empty_leaf_count);
        debug!(
            "{mode} primitive references: {} for {} primitives",
            stats.primitive_references, stats.primitive_count
        );
        debug!(
            "{mode} primitive references per leaf: {:.2} (fill {}, depth {})",
            stats.avg_leaf_primitive_references, stats.leaf_fill, stats.leaf_depth
        );
        debug!("{mode} build: {:?}", self.report);
    }

    /// Prints the node hierarchy to stdout.
    pub fn print_tree(&self) {
        let mut out = String::new();
        if self.write_tree(&mut out).is_ok() {
            print!("{out}");
        }
    }

    pub fn write_tree(&self, out: &mut impl fmt::Write) -> fmt::Result {
        self.write_recursive(out, 0, CompressedNodeLink::ROOT, &self.world_bound)
    }

    fn write_recursive(
        &self,
        out: &mut impl fmt::Write,
        indent: usize,
        link: CompressedNodeLink,
        bounds: &WorldBox,
    ) -> fmt::Result {
        let prefix = "  ".repeat(indent);
        let min = bounds.min.coords.as_slice();
        let max = bounds.max.coords.as_slice();

        match link.decode() {
            NodeLink::Empty => writeln!(out, "{prefix}- empty"),
            NodeLink::Inner { index } => {
                writeln!(out, "{prefix}- I{}: {min:?} - {max:?}", index.raw())?;
                let node = &self.nodes[index];
                for (child, child_link) in node.child_links.iter().enumerate() {
                    let child_bounds = node.child_bounds.extract(child);
                    self.write_recursive(out, indent + 1, *child_link, &child_bounds)?;
                }
                Ok(())
            }
            NodeLink::Leaf { quads } => {
                writeln!(
                    out,
                    "{prefix}- L{}+{}: {min:?} - {max:?}",
                    quads.first.raw(),
                    quads.len()
                )?;
                for quad in quads.iter() {
                    for primitive in self.quads[quad].primitives() {
                        let b = primitive.world_bound();
                        writeln!(
                            out,
                            "{prefix}    {:?} - {:?}",
                            b.min.coords.as_slice(),
                            b.max.coords.as_slice()
                        )?;
                    }
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::{assert, let_assert};
    use test_case::test_case;

    use crate::scene::{
        PrimitiveRef,
        qbvh::{QbvhSettings, SplitMode},
        test::{random_triangles, triangle},
    };

    #[test_case(SplitMode::Object)]
    #[test_case(SplitMode::Spatial)]
    fn random_scene(split_mode: SplitMode) {
        let primitives = random_triangles(1000, 42);
        let settings = QbvhSettings::builder().split_mode(split_mode).build();
        let_assert!(Ok(bvh) = Qbvh::new(&primitives, settings));

        let stats = bvh.statistics();
        assert!(stats.sah_cost.is_finite());
        assert!(stats.sah_cost > 1.0);
        assert!(stats.node_count == bvh.node_count());
        assert!(stats.max_depth > 0);
        assert!(stats.max_depth <= 32);
        assert!(stats.primitive_count == 1000);
        assert!(stats.primitive_references >= 1000);
        assert!(stats.avg_leaf_primitive_references >= 1.0);
        assert!(stats.avg_leaf_primitive_references <= 4.0);
        assert!(stats.leaf_fill.max <= 4);
        assert!(
            stats.empty_leaf_count + stats.non_empty_leaf_count + stats.node_count - 1
                == 4 * stats.node_count
        );

        if split_mode == SplitMode::Object {
            assert!(stats.primitive_references == 1000);
        }
    }

    #[test]
    fn single_leaf() {
        let t = triangle([0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]);
        let_assert!(Ok(bvh) = Qbvh::new(&[t], QbvhSettings::default()));

        let stats = bvh.statistics();
        assert!(stats.node_count == 1);
        assert!(stats.max_depth == 0);
        assert!(stats.empty_leaf_count == 3);
        assert!(stats.non_empty_leaf_count == 1);
        assert!(stats.primitive_references == 1);
        assert!(stats.avg_leaf_primitive_references == 1.0);
        // The leaf box is the whole scene
        assert!(stats.sah_cost == 5.0);
    }

    #[test]
    fn empty_scene() {
        let_assert!(Ok(bvh) = Qbvh::new(&[], QbvhSettings::default()));

        let stats = bvh.statistics();
        assert!(stats.node_count == 1);
        assert!(stats.empty_leaf_count == 4);
        assert!(stats.non_empty_leaf_count == 0);
        assert!(stats.avg_leaf_primitive_references == 0.0);
        assert!(stats.sah_cost == 1.0);
    }

    #[test]
    fn tree_dump() {
        let primitives: Vec<PrimitiveRef> = (0..6)
            .map(|i| {
                let x = i as f32;
                triangle([x, 0.0, 0.0], [x + 0.5, 0.0, 0.0], [x, 0.5, 0.0])
            })
            .collect();
        let settings = QbvhSettings::builder().max_prims_per_leaf(2).build();
        let_assert!(Ok(bvh) = Qbvh::new(&primitives, settings));

        let mut out = String::new();
        assert!(bvh.write_tree(&mut out).is_ok());

        let lines: Vec<&str> = out.lines().collect();
        assert!(lines[0].starts_with("- I0:"));
        assert!(lines.iter().filter(|l| l.trim_start().starts_with("- L")).count() >= 3);
        // Every primitive is listed under its leaf
        assert!(lines.iter().filter(|l| !l.trim_start().starts_with('-')).count() == 6);
    }
}
