//! Buffer dimensions derived from world configuration.

use terra_config::WorldConfig;

/// Threads per workgroup along each axis of the generation kernels.
pub const WORKGROUP_SIZE: u32 = 8;

/// Workgroup counts for one generation dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadGroups {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

/// Sizes of every scratch array in a [`GenerationBuffer`](crate::GenerationBuffer).
///
/// A buffer covers a cube of `chunk_size + margin` voxels per axis; the
/// extra rows on the positive side duplicate the neighbouring chunks so
/// contouring never reads another chunk's buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferLayout {
    pub chunk_size: u32,
    pub margin: u32,
    pub dim: u32,
}

impl BufferLayout {
    pub fn new(chunk_size: u32, margin: u32) -> Self {
        Self {
            chunk_size,
            margin,
            dim: chunk_size + margin,
        }
    }

    pub fn from_world(world: &WorldConfig) -> Self {
        Self::new(world.chunk_size, world.margin)
    }

    pub fn voxel_count(&self) -> usize {
        (self.dim as usize).pow(3)
    }

    pub fn height_count(&self) -> usize {
        (self.dim as usize).pow(2)
    }

    /// Upper bound on faces: each core cell owns at most its three positive faces.
    pub fn max_faces(&self) -> usize {
        3 * (self.chunk_size as usize).pow(3)
    }

    pub fn max_vertices(&self) -> usize {
        self.max_faces() * 4
    }

    pub fn max_indices(&self) -> usize {
        self.max_faces() * 6
    }

    /// Faces reserved up front for mesh output; buffers grow past it on
    /// unusually rough chunks.
    pub fn initial_face_capacity(&self) -> usize {
        (12 * self.height_count()).min(self.max_faces())
    }

    #[inline]
    pub fn voxel_index(&self, x: u32, y: u32, z: u32) -> usize {
        let dim = self.dim as usize;
        x as usize + dim * (y as usize + dim * z as usize)
    }

    #[inline]
    pub fn height_index(&self, x: u32, z: u32) -> usize {
        x as usize + self.dim as usize * z as usize
    }

    /// One workgroup per started block of eight voxels, plus one.
    pub fn thread_groups(&self) -> ThreadGroups {
        let groups = self.dim / WORKGROUP_SIZE + 1;
        ThreadGroups {
            x: groups,
            y: groups,
            z: groups,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_from_default_world() {
        let layout = BufferLayout::from_world(&WorldConfig::default());
        assert_eq!(layout.dim, 18);
        assert_eq!(layout.voxel_count(), 18 * 18 * 18);
        assert_eq!(layout.height_count(), 18 * 18);
        assert_eq!(layout.max_faces(), 3 * 16 * 16 * 16);
    }

    #[test]
    fn test_thread_groups_cover_dim() {
        let layout = BufferLayout::new(16, 2);
        let groups = layout.thread_groups();
        assert_eq!(groups, ThreadGroups { x: 3, y: 3, z: 3 });
        assert!(groups.x * WORKGROUP_SIZE >= layout.dim);

        let exact = BufferLayout::new(14, 2).thread_groups();
        assert_eq!(exact.x, 3);
    }

    #[test]
    fn test_indices_are_dense() {
        let layout = BufferLayout::new(4, 1);
        assert_eq!(layout.voxel_index(0, 0, 0), 0);
        assert_eq!(layout.voxel_index(4, 4, 4), layout.voxel_count() - 1);
        assert_eq!(layout.height_index(4, 4), layout.height_count() - 1);
        assert!(layout.initial_face_capacity() <= layout.max_faces());
    }
}
