//! Per-chunk statistics derived from the height readback.

use glam::IVec3;

use crate::buffer::GenerationBuffer;

/// Tree flags above this value mark a tree column.
const TREE_FLAG: f32 = 0.5;

/// Values computed on the host from a chunk's height map and counters.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChunkSummary {
    pub contains_water: bool,
    /// Trees whose base lies inside this leaf.
    pub tree_count: u32,
    /// Mean surface height over the core columns.
    pub average_height: f32,
    pub solid_voxels: u32,
}

impl ChunkSummary {
    /// Summarise the core `chunk_size x chunk_size` columns of a buffer
    /// generated for the leaf at `anchor`.
    pub fn from_buffer(buffer: &GenerationBuffer, anchor: IVec3) -> Self {
        let layout = buffer.layout();
        let c = layout.chunk_size;
        let floor = anchor.y as f32;
        let ceiling = floor + c as f32;

        let mut total = 0.0_f64;
        let mut trees = 0;
        for z in 0..c {
            for x in 0..c {
                let [height, tree] = buffer.height_map[layout.height_index(x, z)];
                total += f64::from(height);
                if tree > TREE_FLAG && (floor..ceiling).contains(&height) {
                    trees += 1;
                }
            }
        }
        let columns = f64::from(c * c).max(1.0);

        Self {
            contains_water: buffer.counts.water > 0,
            tree_count: trees,
            average_height: (total / columns) as f32,
            solid_voxels: buffer.counts.solid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BufferLayout, BufferPool};

    #[test]
    fn test_summary_over_core_columns() {
        let pool = BufferPool::new(BufferLayout::new(4, 1));
        let mut buffer = pool.acquire().unwrap();
        let layout = *buffer.layout();
        for entry in buffer.height_map.iter_mut() {
            *entry = [10.0, 0.0];
        }
        // Margin column is ignored even though it holds a tree.
        buffer.height_map[layout.height_index(4, 0)] = [100.0, 1.0];
        buffer.height_map[layout.height_index(1, 1)] = [18.0, 1.0];
        buffer.height_map[layout.height_index(2, 2)] = [30.0, 1.0];
        buffer.counts.water = 3;
        buffer.counts.solid = 50;

        let summary = ChunkSummary::from_buffer(&buffer, IVec3::new(0, 16, 0));
        assert!(summary.contains_water);
        assert_eq!(summary.tree_count, 1, "only the tree based in [16, 20)");
        assert_eq!(summary.solid_voxels, 50);
        let expected = (14.0 * 10.0 + 18.0 + 30.0) / 16.0;
        assert!((summary.average_height - expected).abs() < 1e-4);
    }

    #[test]
    fn test_dry_chunk() {
        let pool = BufferPool::new(BufferLayout::new(4, 1));
        let buffer = pool.acquire().unwrap();
        let summary = ChunkSummary::from_buffer(&buffer, IVec3::ZERO);
        assert!(!summary.contains_water);
        assert_eq!(summary.tree_count, 0);
    }
}
