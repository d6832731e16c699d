//! Host density stage: terrain plus stored edits into a generation buffer.

use glam::IVec3;
use terra_voxel::VoxelStore;

use super::terrain::Terrain;
use crate::buffer::GenerationBuffer;

/// Fill `buffer` for the leaf whose minimum corner is `anchor`.
///
/// Writes every voxel of the `dim^3` cube (core plus positive margin), the
/// `[surface, tree]` height map of its columns, and the solid/water counts.
pub fn fill(terrain: &Terrain, store: &VoxelStore, anchor: IVec3, buffer: &mut GenerationBuffer) {
    let layout = *buffer.layout();
    let dim = layout.dim;

    for z in 0..dim {
        for x in 0..dim {
            let wx = anchor.x + x as i32;
            let wz = anchor.z + z as i32;
            let surface = terrain.surface_height(wx, wz);
            let tree = terrain.has_tree(wx, wz, surface);
            buffer.height_map[layout.height_index(x, z)] = [surface as f32, f32::from(u8::from(tree))];

            for y in 0..dim {
                let voxel = terrain.voxel_at(anchor.y + y as i32, surface, tree);
                buffer.voxels[layout.voxel_index(x, y, z)] = voxel;
            }
        }
    }

    // Edits are stored per column with the world height as local y.
    let column = IVec3::new(anchor.x, 0, anchor.z);
    let heights = anchor.y..anchor.y + dim as i32;
    for (local, voxel) in store.column_edits(column, heights) {
        let (x, y, z) = (local.x as u32, (local.y - anchor.y) as u32, local.z as u32);
        if x < dim && z < dim {
            buffer.voxels[layout.voxel_index(x, y, z)] = voxel;
        }
    }

    let mut solid = 0;
    let mut water = 0;
    for voxel in &buffer.voxels {
        if !voxel.is_air() {
            solid += 1;
        }
        if voxel.is_water() {
            water += 1;
        }
    }
    buffer.counts.solid = solid;
    buffer.counts.water = water;
}
