use arrayvec::ArrayVec;

use super::QUAD_SIZE;
use crate::geometry::{FloatType, WorldBox, WorldPoint};

pub const MAX_BINS: usize = 64;

/// Surface area heuristic estimate of a child: area times the number of quad groups.
pub fn child_cost(bounds: &WorldBox, count: usize) -> FloatType {
    bounds.surface_area() * count.div_ceil(QUAD_SIZE) as FloatType
}

/// Split between bins `bin` and `bin + 1`, with the children it would create.
#[derive(Clone, Copy, Debug)]
pub struct SplitCandidate {
    pub bin: usize,
    pub cost: FloatType,
    pub left_bounds: WorldBox,
    pub right_bounds: WorldBox,
    pub left_count: usize,
    pub right_count: usize,
}

#[derive(Clone, Debug)]
pub struct Bins<const N: usize> {
    pub bounds: [WorldBox; N],
    /// Number of references starting in each bin
    pub entries: [usize; N],
    /// Number of references ending in each bin
    pub exits: [usize; N],
}

impl<const N: usize> Bins<N> {
    pub fn new() -> Self {
        Bins {
            bounds: [WorldBox::empty(); N],
            entries: [0; N],
            exits: [0; N],
        }
    }

    /// Adds a reference that falls into a single bin.
    pub fn add(&mut self, bin: usize, bounds: &WorldBox) {
        self.bounds[bin] = self.bounds[bin].union(bounds);
        self.entries[bin] += 1;
        self.exits[bin] += 1;
    }

    /// Evaluates the splits between neighboring bins.
    /// Splits leaving one side without references are skipped, with `require_filled_bins`
    /// also the ones where either neighboring bin has no geometry.
    pub fn candidates(&self, require_filled_bins: bool) -> ArrayVec<SplitCandidate, MAX_BINS> {
        assert!(N <= MAX_BINS);

        let mut right_bounds = [WorldBox::empty(); N];
        let mut right_counts = [0; N];
        let mut bounds = WorldBox::empty();
        let mut count = 0;
        for i in (1..N).rev() {
            bounds = bounds.union(&self.bounds[i]);
            count += self.exits[i];
            right_bounds[i] = bounds;
            right_counts[i] = count;
        }

        let mut ret = ArrayVec::new();
        let mut left_bounds = WorldBox::empty();
        let mut left_count = 0;
        for i in 0..(N - 1) {
            left_bounds = left_bounds.union(&self.bounds[i]);
            left_count += self.entries[i];
            let right_count = right_counts[i + 1];

            if left_count == 0 || right_count == 0 {
                continue;
            }
            if require_filled_bins && !(self.bounds[i].is_valid() && self.bounds[i + 1].is_valid())
            {
                continue;
            }

            ret.push(SplitCandidate {
                bin: i,
                cost: child_cost(&left_bounds, left_count)
                    + child_cost(&right_bounds[i + 1], right_count),
                left_bounds,
                right_bounds: right_bounds[i + 1],
                left_count,
                right_count,
            });
        }
        ret
    }

    /// Cheapest candidate, the lowest bin wins ties.
    pub fn best_split(&self, require_filled_bins: bool) -> Option<SplitCandidate> {
        let mut best: Option<SplitCandidate> = None;
        for candidate in self.candidates(require_filled_bins) {
            if best.is_none_or(|b| candidate.cost < b.cost) {
                best = Some(candidate);
            }
        }
        best
    }
}

/// Maps primitive centroids to `N` equal bins along the longest axis of the centroid bounds.
#[derive(Clone, Copy, Debug)]
pub struct CentroidBinning<const N: usize> {
    pub axis: usize,
    k0: FloatType,
    k1: FloatType,
    extent: FloatType,
}

impl<const N: usize> CentroidBinning<N> {
    /// Returns None if the centroids are too close together to be binned.
    pub fn new(centroid_bounds: &WorldBox) -> Option<Self> {
        let axis = centroid_bounds.maximum_extent();
        let k0 = centroid_bounds.min[axis];
        let extent = centroid_bounds.max[axis] - k0;
        let k1 = N as FloatType / extent;

        (k1.is_finite() && k1 > 0.0).then_some(CentroidBinning {
            axis,
            k0,
            k1,
            extent,
        })
    }

    pub fn bin(&self, centroid: &WorldPoint) -> usize {
        let bin = (self.k1 * (centroid[self.axis] - self.k0)).floor();
        (bin as usize).min(N - 1)
    }

    /// Position of the plane between `bin` and `bin + 1`.
    pub fn split_position(&self, bin: usize) -> FloatType {
        self.k0 + (bin + 1) as FloatType * self.extent / N as FloatType
    }
}
