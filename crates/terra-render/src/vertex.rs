//! Interleaved vertex format for chunk meshes.

use bytemuck::{Pod, Zeroable};
use terra_generation::GenerationBuffer;

/// One mesh vertex as laid out in the GPU vertex buffer.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ChunkVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub color: [f32; 4],
}

impl ChunkVertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 3] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x4];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<ChunkVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

/// Zip the contour stage's position, normal and color streams.
///
/// Stops at the shortest stream, so a buffer whose streams disagree never
/// yields vertices with garbage attributes.
pub fn interleave(buffer: &GenerationBuffer) -> Vec<ChunkVertex> {
    buffer
        .vertices
        .iter()
        .zip(&buffer.normals)
        .zip(&buffer.colors)
        .map(|((position, normal), color)| ChunkVertex {
            position: *position,
            normal: *normal,
            color: *color,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use terra_generation::{BufferLayout, BufferPool};

    use super::*;

    #[test]
    fn test_vertex_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<ChunkVertex>(), 40);
        assert_eq!(ChunkVertex::layout().array_stride, 40);
        assert_eq!(ChunkVertex::layout().attributes[2].offset, 24);
    }

    #[test]
    fn test_interleave_pairs_streams() {
        let pool = BufferPool::new(BufferLayout::new(4, 1));
        let mut buffer = pool.acquire().unwrap();
        buffer.vertices.extend([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        buffer.normals.extend([[0.0, 1.0, 0.0], [0.0, -1.0, 0.0]]);
        buffer.colors.extend([[0.5; 4], [0.25; 4]]);

        let vertices = interleave(&buffer);
        assert_eq!(vertices.len(), 2);
        assert_eq!(vertices[1].position, [4.0, 5.0, 6.0]);
        assert_eq!(vertices[1].normal, [0.0, -1.0, 0.0]);
        assert_eq!(vertices[0].color, [0.5; 4]);
    }
}
