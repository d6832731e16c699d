//! The growable root wrapper.

use glam::{DVec3, I64Vec3, IVec3};
use terra_math::Aabb;

use crate::aggregate::{CellStats, Summarize};
use crate::error::OctreeError;
use crate::node::{NodeKind, OctreeNode, grid_children, split_grid};

/// Sides of the root footprint a visibility circle crosses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BoundaryViolation {
    pub neg_x: bool,
    pub pos_x: bool,
    pub neg_z: bool,
    pub pos_z: bool,
}

impl BoundaryViolation {
    /// Which sides of `bounds` the circle of `radius` around `center` crosses.
    pub fn of(bounds: &Aabb, center: DVec3, radius: f64) -> Self {
        Self {
            neg_x: center.x - radius < bounds.min.x as f64,
            pos_x: center.x + radius > bounds.max.x as f64,
            neg_z: center.z - radius < bounds.min.z as f64,
            pos_z: center.z + radius > bounds.max.z as f64,
        }
    }

    pub fn any(&self) -> bool {
        self.neg_x || self.pos_x || self.neg_z || self.pos_z
    }
}

/// Slot of the old root along one axis of the new root's child grid.
///
/// Growth goes toward the violated side; with both or neither side
/// violated the old root sits in the middle slot.
fn graft_slot(slots: i32, neg: bool, pos: bool) -> i32 {
    match (neg, pos) {
        (false, true) => 0,
        (true, false) => slots - 1,
        _ => (slots - 1) / 2,
    }
}

/// Shape of the root one expansion step later.
struct Growth {
    bounds: Aabb,
    grid: IVec3,
    /// Child index the old root takes.
    graft: usize,
}

impl Growth {
    fn plan(old: &Aabb, violation: BoundaryViolation, chunk_size: i32) -> Result<Self, OctreeError> {
        let size = old.size().as_i64vec3();
        let (new_size, grid) = if size.x == size.z {
            (I64Vec3::new(size.x * 4, size.y, size.x * 2), IVec3::new(4, 1, 2))
        } else {
            (I64Vec3::new(size.x * 2, size.y, size.x * 2), IVec3::new(2, 1, 4))
        };

        let ix = graft_slot(grid.x, violation.neg_x, violation.pos_x);
        let iz = graft_slot(grid.z, violation.neg_z, violation.pos_z);
        let min = old.min.as_i64vec3() - I64Vec3::new(ix as i64 * size.x, 0, iz as i64 * size.z);
        let bounds =
            to_i32_bounds(min, new_size).ok_or(OctreeError::ExtentOverflow { bounds: *old })?;

        if split_grid(&bounds, chunk_size)? != Some(grid) {
            return Err(OctreeError::InvalidShape { bounds });
        }
        Ok(Self {
            bounds,
            grid,
            graft: (ix + grid.x * grid.y * iz) as usize,
        })
    }
}

/// Spatial index over a fixed-height, horizontally unbounded world.
#[derive(Debug, Clone)]
pub struct Octree<T> {
    root: OctreeNode<T>,
    chunk_size: i32,
    version: u64,
}

impl<T> Octree<T> {
    /// Build a tree whose root is a square column of height `column_height`
    /// centered on the origin, at least `initial_extent` voxels wide.
    ///
    /// Valid square widths are `column_height * 8^k`.
    pub fn new(
        chunk_size: i32,
        column_height: i32,
        initial_extent: i32,
    ) -> Result<Self, OctreeError> {
        let mut side = column_height;
        while side < initial_extent {
            side = side.checked_mul(8).ok_or(OctreeError::ExtentOverflow {
                bounds: Aabb::from_min_size(IVec3::ZERO, IVec3::splat(column_height)),
            })?;
        }
        let bounds = Aabb::from_min_size(
            IVec3::new(-side / 2, 0, -side / 2),
            IVec3::new(side, column_height, side),
        );
        Self::with_root(bounds, chunk_size)
    }

    /// Build a tree over arbitrary root bounds, validating that they can be
    /// partitioned into chunk-sized leaves.
    pub fn with_root(bounds: Aabb, chunk_size: i32) -> Result<Self, OctreeError> {
        if chunk_size <= 0 || !(chunk_size as u32).is_power_of_two() {
            return Err(OctreeError::InvalidChunkSize(chunk_size));
        }
        if !is_partitionable(bounds.size(), chunk_size) {
            return Err(OctreeError::InvalidShape { bounds });
        }
        let mut root = OctreeNode::new(bounds);
        root.subdivide(chunk_size)?;
        Ok(Self {
            root,
            chunk_size,
            version: 0,
        })
    }

    pub fn root(&self) -> &OctreeNode<T> {
        &self.root
    }

    pub fn bounds(&self) -> &Aabb {
        &self.root.bounds
    }

    pub fn chunk_size(&self) -> i32 {
        self.chunk_size
    }

    pub fn column_height(&self) -> i32 {
        self.root.bounds.size().y
    }

    /// Incremented by every root expansion.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn find_leaf(&self, p: IVec3) -> Option<&OctreeNode<T>> {
        self.root.find_leaf(p)
    }

    pub fn find_leaf_mut(&mut self, p: IVec3) -> Option<&mut OctreeNode<T>> {
        self.root.find_leaf_mut(p)
    }

    /// Leaves whose bounds are closer than `max_distance` to `center`,
    /// measured horizontally from the closest point of each cell. A leaf at
    /// exactly `max_distance` is out of range.
    pub fn leaves_within_distance(&self, center: DVec3, max_distance: f64) -> Vec<&OctreeNode<T>> {
        let mut out = Vec::new();
        self.root
            .collect_within(center, max_distance * max_distance, &mut out);
        out
    }

    pub fn for_each_leaf(&self, mut f: impl FnMut(&OctreeNode<T>)) {
        self.root.for_each_leaf(&mut f);
    }

    pub fn for_each_leaf_mut(&mut self, mut f: impl FnMut(&mut OctreeNode<T>)) {
        self.root.for_each_leaf_mut(&mut f);
    }

    pub fn leaf_count(&self) -> usize {
        let mut count = 0;
        self.root.for_each_leaf(&mut |_| count += 1);
        count
    }

    pub fn contains_circle(&self, center: DVec3, radius: f64) -> bool {
        self.root.bounds.contains_circle(center, radius)
    }

    /// Replace the root with one a step larger, grown toward the violated
    /// sides, and graft the current root into the matching child slot.
    ///
    /// Square roots grow into 2:1 columns (4x2 grid of old-root slots) and
    /// 2:1 columns into squares (2x4 grid). Every payload under the old root
    /// stays reachable.
    pub fn expand_root(&mut self, violation: BoundaryViolation) -> Result<(), OctreeError> {
        let old = self.root.bounds;
        let growth = Growth::plan(&old, violation, self.chunk_size)?;

        let mut children = grid_children(growth.bounds.min, old.size(), growth.grid);
        for (i, child) in children.iter_mut().enumerate() {
            if i != growth.graft {
                child.subdivide(self.chunk_size)?;
            }
        }

        let old_root = std::mem::replace(&mut self.root, OctreeNode::new(growth.bounds));
        debug_assert_eq!(children[growth.graft].bounds, old_root.bounds);
        children[growth.graft] = old_root;
        self.root.kind = NodeKind::Branch(children);
        self.version += 1;
        Ok(())
    }

    /// Expand until the circle of `radius` around `center` fits in the root.
    /// Returns the number of expansions performed.
    ///
    /// The whole sequence is planned first: if it needs more than
    /// `max_steps` expansions the tree is left untouched.
    pub fn expand_to_contain(
        &mut self,
        center: DVec3,
        radius: f64,
        max_steps: u32,
    ) -> Result<u32, OctreeError> {
        let mut bounds = self.root.bounds;
        let mut steps = 0;
        while !bounds.contains_circle(center, radius) {
            if steps >= max_steps {
                return Err(OctreeError::ExpansionLimit { steps });
            }
            let violation = BoundaryViolation::of(&bounds, center, radius);
            bounds = Growth::plan(&bounds, violation, self.chunk_size)?.bounds;
            steps += 1;
        }

        for _ in 0..steps {
            let violation = BoundaryViolation::of(&self.root.bounds, center, radius);
            self.expand_root(violation)?;
        }
        Ok(steps)
    }

    pub fn validate(&self) -> Result<(), OctreeError> {
        self.root.validate(self.chunk_size)
    }

    /// Payload-free copy of the topology, sharing the version number.
    pub fn skeleton(&self) -> Octree<()> {
        Octree {
            root: self.root.skeleton(),
            chunk_size: self.chunk_size,
            version: self.version,
        }
    }
}

impl<T: Summarize> Octree<T> {
    /// Recompute cached statistics for the whole tree.
    pub fn aggregate(&mut self) -> CellStats {
        self.root.aggregate()
    }
}

fn to_i32_bounds(min: I64Vec3, size: I64Vec3) -> Option<Aabb> {
    let max = min + size;
    let convert = |v: I64Vec3| -> Option<IVec3> {
        Some(IVec3::new(
            i32::try_from(v.x).ok()?,
            i32::try_from(v.y).ok()?,
            i32::try_from(v.z).ok()?,
        ))
    };
    Some(Aabb::new(convert(min)?, convert(max)?))
}

/// True if repeated application of the split rule ends in chunk-sized
/// leaves with every split exact.
fn is_partitionable(size: IVec3, chunk_size: i32) -> bool {
    let height = size.y;
    if height < chunk_size || height % chunk_size != 0 {
        return false;
    }
    if !((height / chunk_size) as u32).is_power_of_two() {
        return false;
    }
    let mut horizontal = (size.x, size.z);
    loop {
        match horizontal {
            (x, z) if x == height && z == height => return true,
            (x, z) if x == z && x > height && x % 2 == 0 && z % 4 == 0 => {
                horizontal = (x / 2, z / 4);
            }
            (x, z) if x == 2 * z && x > height && x % 4 == 0 && z % 2 == 0 => {
                horizontal = (x / 4, z / 2);
            }
            _ => return false,
        }
    }
}
