pub mod simd;
mod stats;

pub use stats::Stats;

use crate::geometry::SIMD_LANES;

/// Lanes selected by a SIMD comparison mask, lowest lane first.
pub fn mask_lanes(mask: u32) -> MaskLanes {
    debug_assert!(mask >> SIMD_LANES == 0, "mask {mask:#b} has bits past the last lane");
    MaskLanes(mask)
}

#[derive(Copy, Clone, Debug)]
pub struct MaskLanes(u32);

impl Iterator for MaskLanes {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        (self.0 != 0).then(|| {
            let lane = self.0.trailing_zeros() as usize;
            self.0 &= self.0 - 1;
            lane
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let count = self.0.count_ones() as usize;
        (count, Some(count))
    }
}

impl ExactSizeIterator for MaskLanes {}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::assert;
    use test_case::test_case;

    #[test_case(0b0000 => Vec::<usize>::new())]
    #[test_case(0b0001 => vec![0])]
    #[test_case(0b1010 => vec![1, 3])]
    #[test_case(0b1111 => vec![0, 1, 2, 3])]
    fn lanes_of_mask(mask: u32) -> Vec<usize> {
        mask_lanes(mask).collect()
    }

    #[test]
    fn exact_len() {
        let mut lanes = mask_lanes(0b1101);
        assert!(lanes.len() == 3);
        lanes.next();
        assert!(lanes.len() == 2);
    }
}
