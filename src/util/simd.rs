use crate::geometry::{
    FloatType, SIMD_LANES, SimdFloatType, WorldPoint, WorldPoint4, WorldVector, WorldVector4,
};

/// Per-lane access that `wide` doesn't provide directly.
pub trait SimdFloatExt: Copy {
    fn lane(&self, lane: usize) -> FloatType;
    fn set_lane(&mut self, lane: usize, value: FloatType);

    /// Replaces NaN lanes with `replacement`
    fn nan_to(self, replacement: FloatType) -> Self;
}

impl SimdFloatExt for SimdFloatType {
    #[inline(always)]
    fn lane(&self, lane: usize) -> FloatType {
        self.as_array_ref()[lane]
    }

    #[inline(always)]
    fn set_lane(&mut self, lane: usize, value: FloatType) {
        let mut array = self.to_array();
        array[lane] = value;
        *self = SimdFloatType::new(array);
    }

    #[inline(always)]
    fn nan_to(self, replacement: FloatType) -> Self {
        self.is_nan().blend(SimdFloatType::splat(replacement), self)
    }
}

pub fn splat_point(p: &WorldPoint) -> WorldPoint4 {
    WorldPoint4::new(
        SimdFloatType::splat(p.x),
        SimdFloatType::splat(p.y),
        SimdFloatType::splat(p.z),
    )
}

pub fn splat_vector(v: &WorldVector) -> WorldVector4 {
    WorldVector4::new(
        SimdFloatType::splat(v.x),
        SimdFloatType::splat(v.y),
        SimdFloatType::splat(v.z),
    )
}

/// Packs four points into a single SoA point, one per lane.
pub fn gather_points(points: [WorldPoint; SIMD_LANES]) -> WorldPoint4 {
    WorldPoint4::new(
        SimdFloatType::new(points.map(|p| p.x)),
        SimdFloatType::new(points.map(|p| p.y)),
        SimdFloatType::new(points.map(|p| p.z)),
    )
}

/// Packs four vectors into a single SoA vector, one per lane.
pub fn gather_vectors(vectors: [WorldVector; SIMD_LANES]) -> WorldVector4 {
    WorldVector4::new(
        SimdFloatType::new(vectors.map(|v| v.x)),
        SimdFloatType::new(vectors.map(|v| v.y)),
        SimdFloatType::new(vectors.map(|v| v.z)),
    )
}

pub fn extract_point(p: &WorldPoint4, lane: usize) -> WorldPoint {
    WorldPoint::new(p.x.lane(lane), p.y.lane(lane), p.z.lane(lane))
}

pub fn extract_vector(v: &WorldVector4, lane: usize) -> WorldVector {
    WorldVector::new(v.x.lane(lane), v.y.lane(lane), v.z.lane(lane))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::assert;
    use proptest::{prelude::Strategy, prop_assert};
    use test_strategy::proptest;

    #[test]
    fn set_lane_only_changes_one_lane() {
        let mut v = SimdFloatType::new([1.0, 2.0, 3.0, 4.0]);
        v.set_lane(2, 10.0);
        assert!(v.to_array() == [1.0, 2.0, 10.0, 4.0]);
    }

    #[test]
    fn nan_to_replaces_only_nans() {
        let v = SimdFloatType::new([1.0, f32::NAN, -3.0, f32::NAN]);
        let replaced = v.nan_to(f32::INFINITY);
        assert!(replaced.to_array() == [1.0, f32::INFINITY, -3.0, f32::INFINITY]);
    }

    fn world_point_strategy() -> impl Strategy<Value = WorldPoint> {
        proptest::array::uniform3(-1e3f32..1e3f32).prop_map_into()
    }

    #[proptest]
    fn gather_then_extract(
        #[strategy(proptest::array::uniform4(world_point_strategy()))] points: [WorldPoint; 4],
    ) {
        let packed = gather_points(points);
        for (lane, p) in points.iter().enumerate() {
            prop_assert!(extract_point(&packed, lane) == *p);
        }

        let vectors = points.map(|p| p.coords);
        let packed = gather_vectors(vectors);
        for (lane, v) in vectors.iter().enumerate() {
            prop_assert!(extract_vector(&packed, lane) == *v);
        }
    }

    #[test]
    fn splat_fills_all_lanes() {
        let p = WorldPoint::new(1.0, 2.0, 3.0);
        let packed = splat_point(&p);
        for lane in 0..SIMD_LANES {
            assert!(extract_point(&packed, lane) == p);
        }
        let packed = splat_vector(&p.coords);
        assert!(extract_vector(&packed, 3) == p.coords);
    }
}
