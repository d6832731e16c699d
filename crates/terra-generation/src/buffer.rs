//! Pooled scratch bundle for one chunk generation.

use bytemuck::{Pod, Zeroable};
use static_assertions::assert_eq_size;
use terra_voxel::Voxel;

use crate::layout::BufferLayout;
use crate::pool::PoolError;

/// Stable identity of a pooled buffer, used to observe reuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u32);

/// Result counters written by the generation stages. This is the small
/// fixed-size block read back to decide whether a chunk is empty.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct GenerationCounts {
    /// Non-air voxels, water included.
    pub solid: u32,
    pub water: u32,
    pub vertices: u32,
    pub indices: u32,
    pub transparent_indices: u32,
}

assert_eq_size!(GenerationCounts, [u32; 5]);

impl GenerationCounts {
    pub fn is_empty(&self) -> bool {
        self.solid == 0
    }
}

/// Voxel, height-map, counter and mesh scratch arrays for one chunk.
pub struct GenerationBuffer {
    id: BufferId,
    layout: BufferLayout,
    /// `dim^3` voxels, x-fastest.
    pub voxels: Vec<Voxel>,
    /// `dim^2` entries of `[surface height, tree flag]`.
    pub height_map: Vec<[f32; 2]>,
    pub counts: GenerationCounts,
    pub vertices: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub colors: Vec<[f32; 4]>,
    pub indices: Vec<u32>,
    pub transparent_indices: Vec<u32>,
}

impl GenerationBuffer {
    /// Allocate every array at its full size, failing instead of aborting
    /// when memory runs out.
    pub(crate) fn allocate(id: BufferId, layout: BufferLayout) -> Result<Self, PoolError> {
        let faces = layout.initial_face_capacity();
        Ok(Self {
            id,
            layout,
            voxels: filled(layout.voxel_count(), Voxel::AIR, &layout)?,
            height_map: filled(layout.height_count(), [0.0; 2], &layout)?,
            counts: GenerationCounts::default(),
            vertices: reserved(faces * 4, &layout)?,
            normals: reserved(faces * 4, &layout)?,
            colors: reserved(faces * 4, &layout)?,
            indices: reserved(faces * 6, &layout)?,
            transparent_indices: reserved(faces * 6, &layout)?,
        })
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn layout(&self) -> &BufferLayout {
        &self.layout
    }

    /// Clear the result counters and mesh output. Voxel and height data are
    /// overwritten by the next density pass.
    pub fn reset_counters(&mut self) {
        self.counts = GenerationCounts::default();
        self.vertices.clear();
        self.normals.clear();
        self.colors.clear();
        self.indices.clear();
        self.transparent_indices.clear();
    }

    #[inline]
    pub fn voxel(&self, x: u32, y: u32, z: u32) -> Voxel {
        self.voxels[self.layout.voxel_index(x, y, z)]
    }

    /// Raw counter block as it would be copied off the device.
    pub fn counts_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(&self.counts)
    }

    /// Approximate host memory held by this bundle.
    pub fn capacity_bytes(&self) -> usize {
        use std::mem::size_of;
        self.voxels.capacity() * size_of::<Voxel>()
            + self.height_map.capacity() * size_of::<[f32; 2]>()
            + (self.vertices.capacity() + self.normals.capacity()) * size_of::<[f32; 3]>()
            + self.colors.capacity() * size_of::<[f32; 4]>()
            + (self.indices.capacity() + self.transparent_indices.capacity()) * size_of::<u32>()
    }
}

impl std::fmt::Debug for GenerationBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationBuffer")
            .field("id", &self.id)
            .field("dim", &self.layout.dim)
            .field("counts", &self.counts)
            .finish_non_exhaustive()
    }
}

fn reserved<T>(len: usize, layout: &BufferLayout) -> Result<Vec<T>, PoolError> {
    let mut v = Vec::new();
    v.try_reserve_exact(len).map_err(|_| PoolError::Exhausted {
        bytes: len * std::mem::size_of::<T>(),
        dim: layout.dim,
    })?;
    Ok(v)
}

fn filled<T: Clone>(len: usize, value: T, layout: &BufferLayout) -> Result<Vec<T>, PoolError> {
    let mut v = reserved(len, layout)?;
    v.resize(len, value);
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocation_sizes_match_layout() {
        let layout = BufferLayout::new(8, 2);
        let buffer = GenerationBuffer::allocate(BufferId(3), layout).unwrap();
        assert_eq!(buffer.id(), BufferId(3));
        assert_eq!(buffer.voxels.len(), 1000);
        assert_eq!(buffer.height_map.len(), 100);
        assert!(buffer.vertices.capacity() >= layout.initial_face_capacity() * 4);
        assert!(buffer.voxels.iter().all(Voxel::is_air));
    }

    #[test]
    fn test_reset_clears_counters_and_mesh() {
        let mut buffer = GenerationBuffer::allocate(BufferId(0), BufferLayout::new(4, 1)).unwrap();
        buffer.counts.solid = 12;
        buffer.indices.extend([0, 1, 2]);
        buffer.vertices.push([0.0; 3]);
        buffer.reset_counters();
        assert_eq!(buffer.counts, GenerationCounts::default());
        assert!(buffer.indices.is_empty());
        assert!(buffer.vertices.is_empty());
    }

    #[test]
    fn test_counts_readback_layout() {
        let mut buffer = GenerationBuffer::allocate(BufferId(0), BufferLayout::new(4, 1)).unwrap();
        buffer.counts.solid = 1;
        let bytes = buffer.counts_bytes();
        assert_eq!(bytes.len(), 20);
        assert_eq!(bytemuck::pod_read_unaligned::<u32>(&bytes[0..4]), 1);
        assert!(!buffer.counts.is_empty());
    }

    #[test]
    fn test_debug_is_compact() {
        let buffer = GenerationBuffer::allocate(BufferId(9), BufferLayout::new(4, 1)).unwrap();
        let text = format!("{buffer:?}");
        assert!(text.contains("BufferId(9)"));
        assert!(text.len() < 200);
    }
}
