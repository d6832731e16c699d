//! World position <-> (column anchor, local offset) translation.

use glam::IVec3;
use terra_config::WorldConfig;
use terra_math::column_anchor;

/// Chunk geometry needed to address voxels.
///
/// A column anchored at `(ax, 0, az)` stores local x/z in
/// `[0, chunk_size + margin)` and local y in `[0, max_height]`; local y is
/// the world height.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkAddressing {
    chunk_size: i32,
    margin: i32,
    max_height: i32,
}

impl ChunkAddressing {
    pub fn new(chunk_size: u32, margin: u32, max_height: u32) -> Self {
        Self {
            chunk_size: chunk_size as i32,
            margin: margin as i32,
            max_height: max_height as i32,
        }
    }

    pub fn from_world(world: &WorldConfig) -> Self {
        Self::new(world.chunk_size, world.margin, world.max_height)
    }

    pub fn chunk_size(&self) -> i32 {
        self.chunk_size
    }

    pub fn margin(&self) -> i32 {
        self.margin
    }

    pub fn max_height(&self) -> i32 {
        self.max_height
    }

    /// Column anchor of the chunk whose core contains `world`.
    pub fn anchor_of(&self, world: IVec3) -> IVec3 {
        column_anchor(world, self.chunk_size)
    }

    /// Home column and core-local offset of a world position.
    pub fn split(&self, world: IVec3) -> (IVec3, IVec3) {
        let anchor = self.anchor_of(world);
        (anchor, world - anchor)
    }

    /// True if `local` lies in a column's storage (core plus margin).
    pub fn in_range(&self, local: IVec3) -> bool {
        let extent = self.chunk_size + self.margin;
        (0..extent).contains(&local.x)
            && (0..extent).contains(&local.z)
            && (0..=self.max_height).contains(&local.y)
    }

    /// Every column storing the voxel at `anchor + local`, with the position
    /// re-expressed in that column's frame.
    ///
    /// Besides `anchor` itself, an x (or z) offset below the margin is also
    /// held by the `-x` neighbour and an offset at or past the chunk size by
    /// the `+x` neighbour. When both axes qualify the diagonal neighbour is a
    /// candidate too. Candidates outside their column's range are dropped.
    pub fn owners(&self, anchor: IVec3, local: IVec3) -> Owners {
        let step = |v: i32| -> i32 {
            if v < self.margin {
                -1
            } else if v >= self.chunk_size {
                1
            } else {
                0
            }
        };
        let dx = step(local.x);
        let dz = step(local.z);

        let mut owners = Owners::default();
        let mut consider = |sx: i32, sz: i32| {
            let shift = IVec3::new(sx * self.chunk_size, 0, sz * self.chunk_size);
            let candidate = local - shift;
            if self.in_range(candidate) {
                owners.push(anchor + shift, candidate);
            }
        };
        consider(0, 0);
        if dx != 0 {
            consider(dx, 0);
        }
        if dz != 0 {
            consider(0, dz);
        }
        if dx != 0 && dz != 0 {
            consider(dx, dz);
        }
        owners
    }

    /// Owners of a world position.
    pub fn owners_of(&self, world: IVec3) -> Owners {
        let (anchor, local) = self.split(world);
        self.owners(anchor, local)
    }
}

/// Up to four (column anchor, local offset) pairs holding one voxel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Owners {
    entries: [(IVec3, IVec3); 4],
    len: usize,
}

impl Owners {
    fn push(&mut self, anchor: IVec3, local: IVec3) {
        self.entries[self.len] = (anchor, local);
        self.len += 1;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (IVec3, IVec3)> + '_ {
        self.entries[..self.len].iter().copied()
    }

    pub fn anchors(&self) -> impl Iterator<Item = IVec3> + '_ {
        self.iter().map(|(anchor, _)| anchor)
    }
}
