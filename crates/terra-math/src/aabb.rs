use glam::{DVec3, IVec3};

/// Axis-aligned integer box covering `[min, max)` on every axis.
///
/// Invariant: `min <= max` component-wise. The constructor enforces this
/// by swapping components if needed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Aabb {
    pub min: IVec3,
    pub max: IVec3,
}

impl Aabb {
    /// Create a box from two corners. Automatically sorts components so
    /// that `min <= max` on every axis.
    pub fn new(a: IVec3, b: IVec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Create a box from its minimum corner and a non-negative size.
    pub fn from_min_size(min: IVec3, size: IVec3) -> Self {
        Self::new(min, min + size)
    }

    /// Returns true if the point lies inside the half-open box.
    pub fn contains_point(&self, p: IVec3) -> bool {
        p.x >= self.min.x
            && p.x < self.max.x
            && p.y >= self.min.y
            && p.y < self.max.y
            && p.z >= self.min.z
            && p.z < self.max.z
    }

    /// Returns true if `other` lies entirely inside this box.
    pub fn contains_aabb(&self, other: &Aabb) -> bool {
        other.min.cmpge(self.min).all() && other.max.cmple(self.max).all()
    }

    /// Returns true if the two half-open boxes share any volume.
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x < other.max.x
            && self.max.x > other.min.x
            && self.min.y < other.max.y
            && self.max.y > other.min.y
            && self.min.z < other.max.z
            && self.max.z > other.min.z
    }

    /// Returns the smallest box enclosing both `self` and `other`.
    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Size along each axis.
    pub fn size(&self) -> IVec3 {
        self.max - self.min
    }

    /// Geometric center in floating point.
    pub fn center(&self) -> DVec3 {
        (self.min.as_dvec3() + self.max.as_dvec3()) * 0.5
    }

    /// Volume in cubic voxels. Computed in `i64` since world-sized roots
    /// overflow `i32`.
    pub fn volume(&self) -> i64 {
        let s = self.size().as_i64vec3();
        s.x * s.y * s.z
    }

    /// Returns true if the box has zero volume on at least one axis.
    pub fn is_degenerate(&self) -> bool {
        self.min.x == self.max.x || self.min.y == self.max.y || self.min.z == self.max.z
    }

    /// Squared distance from `p` to the closest point of the box on the
    /// x/z plane. Zero when `p` projects inside the box footprint.
    pub fn horizontal_distance_squared(&self, p: DVec3) -> f64 {
        let dx = axis_gap(p.x, self.min.x as f64, self.max.x as f64);
        let dz = axis_gap(p.z, self.min.z as f64, self.max.z as f64);
        dx * dx + dz * dz
    }

    /// Returns true if the horizontal circle of `radius` around `center`
    /// lies entirely inside the box footprint.
    pub fn contains_circle(&self, center: DVec3, radius: f64) -> bool {
        center.x - radius >= self.min.x as f64
            && center.x + radius <= self.max.x as f64
            && center.z - radius >= self.min.z as f64
            && center.z + radius <= self.max.z as f64
    }
}

#[inline]
fn axis_gap(v: f64, lo: f64, hi: f64) -> f64 {
    if v < lo {
        lo - v
    } else if v > hi {
        v - hi
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn unit_box(size: i32) -> Aabb {
        Aabb::from_min_size(IVec3::ZERO, IVec3::splat(size))
    }

    #[test]
    fn test_new_sorts_corners() {
        let aabb = Aabb::new(IVec3::new(10, -2, 5), IVec3::new(0, 8, -5));
        assert_eq!(aabb.min, IVec3::new(0, -2, -5));
        assert_eq!(aabb.max, IVec3::new(10, 8, 5));
    }

    #[test]
    fn test_contains_point_is_half_open() {
        let aabb = unit_box(16);
        assert!(aabb.contains_point(IVec3::ZERO));
        assert!(aabb.contains_point(IVec3::splat(15)));
        assert!(!aabb.contains_point(IVec3::new(16, 0, 0)));
        assert!(!aabb.contains_point(IVec3::new(0, 0, -1)));
    }

    #[test]
    fn test_adjacent_boxes_do_not_intersect() {
        let a = unit_box(16);
        let b = Aabb::from_min_size(IVec3::new(16, 0, 0), IVec3::splat(16));
        assert!(!a.intersects(&b));
        let c = Aabb::from_min_size(IVec3::new(15, 0, 0), IVec3::splat(16));
        assert!(a.intersects(&c));
    }

    #[test]
    fn test_union_encloses_both() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..200 {
            let a = Aabb::from_min_size(
                IVec3::new(rng.random_range(-500..500), 0, rng.random_range(-500..500)),
                IVec3::new(rng.random_range(1..64), 16, rng.random_range(1..64)),
            );
            let b = Aabb::from_min_size(
                IVec3::new(rng.random_range(-500..500), 0, rng.random_range(-500..500)),
                IVec3::new(rng.random_range(1..64), 16, rng.random_range(1..64)),
            );
            let u = a.union(&b);
            assert!(u.contains_aabb(&a), "{u:?} should contain {a:?}");
            assert!(u.contains_aabb(&b), "{u:?} should contain {b:?}");
        }
    }

    #[test]
    fn test_horizontal_distance_ignores_height() {
        let aabb = unit_box(16);
        let inside = DVec3::new(8.0, 1000.0, 8.0);
        assert_eq!(aabb.horizontal_distance_squared(inside), 0.0);

        let east = DVec3::new(19.0, -50.0, 8.0);
        assert!((aabb.horizontal_distance_squared(east) - 9.0).abs() < 1e-9);

        let corner = DVec3::new(-3.0, 0.0, -4.0);
        assert!((aabb.horizontal_distance_squared(corner) - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_contains_circle() {
        let aabb = Aabb::from_min_size(IVec3::new(-64, 0, -64), IVec3::new(128, 128, 128));
        assert!(aabb.contains_circle(DVec3::ZERO, 64.0));
        assert!(!aabb.contains_circle(DVec3::ZERO, 64.5));
        assert!(!aabb.contains_circle(DVec3::new(10.0, 0.0, 0.0), 60.0));
    }

    #[test]
    fn test_volume_does_not_overflow() {
        let aabb = Aabb::from_min_size(IVec3::ZERO, IVec3::new(65536, 128, 65536));
        assert_eq!(aabb.volume(), 65536_i64 * 128 * 65536);
        assert!(!aabb.is_degenerate());
        assert!(Aabb::from_min_size(IVec3::ZERO, IVec3::new(4, 0, 4)).is_degenerate());
    }
}
