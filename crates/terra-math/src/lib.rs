//! Integer spatial primitives shared by the streaming crates.
//!
//! World space is measured in whole voxels. Cell bounds are half-open
//! integer boxes so that any point belongs to exactly one sibling cell,
//! while distance and containment tests against a viewpoint are done in
//! `f64` on the horizontal (x/z) plane only.

mod aabb;

pub use aabb::Aabb;

use glam::IVec3;

/// Round `value` down to the nearest multiple of `step` (floor division).
///
/// `step` must be positive.
#[inline]
pub fn snap_down(value: i32, step: i32) -> i32 {
    value.div_euclid(step) * step
}

/// Column anchor of a world position: x and z snapped down to `chunk_size`,
/// y forced to zero.
#[inline]
pub fn column_anchor(position: IVec3, chunk_size: i32) -> IVec3 {
    IVec3::new(
        snap_down(position.x, chunk_size),
        0,
        snap_down(position.z, chunk_size),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snap_down_positive() {
        assert_eq!(snap_down(0, 16), 0);
        assert_eq!(snap_down(15, 16), 0);
        assert_eq!(snap_down(16, 16), 16);
        assert_eq!(snap_down(33, 16), 32);
    }

    #[test]
    fn test_snap_down_negative_floors() {
        assert_eq!(snap_down(-1, 16), -16);
        assert_eq!(snap_down(-16, 16), -16);
        assert_eq!(snap_down(-17, 16), -32);
    }

    #[test]
    fn test_column_anchor_drops_height() {
        let anchor = column_anchor(IVec3::new(-3, 77, 40), 16);
        assert_eq!(anchor, IVec3::new(-16, 0, 32));
    }
}
