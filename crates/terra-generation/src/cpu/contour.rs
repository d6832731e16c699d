//! Host contour stage: blocky faces between differing voxels.

use glam::UVec3;
use terra_voxel::Voxel;

use crate::buffer::GenerationBuffer;

/// (normal axis, u axis, v axis) with `u x v` pointing along the normal.
const AXES: [(usize, usize, usize); 3] = [(0, 1, 2), (1, 2, 0), (2, 0, 1)];

#[derive(Clone, Copy)]
enum Facing {
    Positive,
    Negative,
}

/// Build the mesh for the core cells of `buffer`.
///
/// Every core cell emits the faces on its three positive sides, reading its
/// neighbour from the margin when it sits on the border, so two chunks never
/// emit the same face. Opaque surfaces go to `indices`, water surfaces
/// against air go to `transparent_indices`. Positions are relative to the
/// leaf anchor.
pub fn build(buffer: &mut GenerationBuffer) {
    buffer.reset_counters();
    let c = buffer.layout().chunk_size;

    for z in 0..c {
        for y in 0..c {
            for x in 0..c {
                let cell = UVec3::new(x, y, z);
                let here = buffer.voxel(x, y, z);
                for (axis, u, v) in AXES {
                    let mut next = cell;
                    next[axis] += 1;
                    let there = buffer.voxel(next.x, next.y, next.z);
                    if let Some((facing, material, transparent)) = classify(here, there) {
                        push_quad(buffer, next, (axis, u, v), facing, material, transparent);
                    }
                }
            }
        }
    }

    buffer.counts.vertices = buffer.vertices.len() as u32;
    buffer.counts.indices = buffer.indices.len() as u32;
    buffer.counts.transparent_indices = buffer.transparent_indices.len() as u32;
}

/// Decide whether the boundary between `here` and its positive neighbour
/// `there` is visible, which way it faces, and which material colours it.
fn classify(here: Voxel, there: Voxel) -> Option<(Facing, Voxel, bool)> {
    match (here.is_opaque(), there.is_opaque()) {
        (true, false) => Some((Facing::Positive, here, false)),
        (false, true) => Some((Facing::Negative, there, false)),
        (true, true) => None,
        (false, false) => match (here.is_water(), there.is_water()) {
            (true, false) => Some((Facing::Positive, here, true)),
            (false, true) => Some((Facing::Negative, there, true)),
            _ => None,
        },
    }
}

fn push_quad(
    buffer: &mut GenerationBuffer,
    plane: UVec3,
    (axis, u, v): (usize, usize, usize),
    facing: Facing,
    material: Voxel,
    transparent: bool,
) {
    let origin = plane.as_vec3();
    let mut du = glam::Vec3::ZERO;
    du[u] = 1.0;
    let mut dv = glam::Vec3::ZERO;
    dv[v] = 1.0;
    let mut normal = [0.0_f32; 3];

    let corners = match facing {
        Facing::Positive => {
            normal[axis] = 1.0;
            [origin, origin + du, origin + du + dv, origin + dv]
        }
        Facing::Negative => {
            normal[axis] = -1.0;
            [origin, origin + dv, origin + du + dv, origin + du]
        }
    };

    let base = buffer.vertices.len() as u32;
    let color = material_color(material);
    for corner in corners {
        buffer.vertices.push(corner.to_array());
        buffer.normals.push(normal);
        buffer.colors.push(color);
    }
    let target = if transparent {
        &mut buffer.transparent_indices
    } else {
        &mut buffer.indices
    };
    target.extend([base, base + 1, base + 2, base, base + 2, base + 3]);
}

/// Flat colour per material id.
pub fn material_color(voxel: Voxel) -> [f32; 4] {
    match voxel.id {
        Voxel::STONE_ID => [0.50, 0.50, 0.52, 1.0],
        Voxel::DIRT_ID => [0.45, 0.32, 0.20, 1.0],
        Voxel::GRASS_ID => [0.30, 0.62, 0.22, 1.0],
        Voxel::SAND_ID => [0.86, 0.80, 0.56, 1.0],
        Voxel::WOOD_ID => [0.40, 0.27, 0.13, 1.0],
        Voxel::LEAVES_ID => [0.18, 0.45, 0.15, 1.0],
        Voxel::WATER_ID => [0.20, 0.40, 0.80, 0.6],
        _ => [1.0, 0.0, 1.0, 1.0],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BufferLayout, BufferPool};

    fn buffer() -> GenerationBuffer {
        BufferPool::new(BufferLayout::new(4, 1)).acquire().unwrap()
    }

    fn set(buffer: &mut GenerationBuffer, x: u32, y: u32, z: u32, voxel: Voxel) {
        let index = buffer.layout().voxel_index(x, y, z);
        buffer.voxels[index] = voxel;
    }

    #[test]
    fn test_empty_buffer_has_no_faces() {
        let mut buffer = buffer();
        build(&mut buffer);
        assert_eq!(buffer.counts.indices, 0);
        assert!(buffer.vertices.is_empty());
    }

    #[test]
    fn test_interior_block_has_six_faces() {
        let mut buffer = buffer();
        set(&mut buffer, 1, 1, 1, Voxel::STONE);
        build(&mut buffer);
        assert_eq!(buffer.indices.len(), 36);
        assert_eq!(buffer.vertices.len(), 24);
        assert_eq!(buffer.counts.vertices, 24);
        assert!(buffer.transparent_indices.is_empty());

        let mut normals = buffer.normals.clone();
        normals.dedup();
        assert_eq!(normals.len(), 6);
    }

    #[test]
    fn test_face_winding_matches_normal() {
        let mut buffer = buffer();
        set(&mut buffer, 1, 1, 1, Voxel::STONE);
        build(&mut buffer);
        for tri in buffer.indices.chunks(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| glam::Vec3::from(buffer.vertices[i as usize]));
            let n = glam::Vec3::from(buffer.normals[tri[0] as usize]);
            assert!((b - a).cross(c - a).dot(n) > 0.0);
        }
    }

    #[test]
    fn test_margin_cells_emit_no_faces_of_their_own() {
        let mut buffer = buffer();
        // Solid only in the +x margin: the core cell facing it gets one face.
        for y in 0..5 {
            for z in 0..5 {
                set(&mut buffer, 4, y, z, Voxel::STONE);
            }
        }
        build(&mut buffer);
        assert_eq!(buffer.indices.len(), 16 * 6);
        assert!(buffer.normals.iter().all(|n| *n == [-1.0, 0.0, 0.0]));
    }

    #[test]
    fn test_water_surface_is_transparent() {
        let mut buffer = buffer();
        for x in 0..5 {
            for z in 0..5 {
                set(&mut buffer, x, 0, z, Voxel::WATER);
            }
        }
        build(&mut buffer);
        assert!(buffer.indices.is_empty());
        assert_eq!(buffer.transparent_indices.len(), 16 * 6);
        assert_eq!(buffer.counts.transparent_indices, 96);
    }

    #[test]
    fn test_stone_under_water_is_opaque_face() {
        let mut buffer = buffer();
        set(&mut buffer, 1, 0, 1, Voxel::STONE);
        set(&mut buffer, 1, 1, 1, Voxel::WATER);
        build(&mut buffer);
        let up = buffer
            .normals
            .iter()
            .filter(|n| **n == [0.0, 1.0, 0.0])
            .count();
        // Stone top against water plus the water top against air.
        assert_eq!(up, 8);
        assert_eq!(material_color(Voxel::WATER)[3], 0.6);
    }
}
