//! GPU-resident chunk meshes keyed by [`MeshHandle`].

use glam::IVec3;
use rustc_hash::FxHashMap;
use terra_generation::{BufferLayout, GenerationBuffer, MeshHandle, MeshSink};

use crate::context::GpuContext;
use crate::pool::{BufferKind, GpuBufferPool, PooledBuffer};
use crate::vertex::{ChunkVertex, interleave};

/// Geometry of one chunk uploaded to the GPU.
#[derive(Debug)]
pub struct GpuChunkMesh {
    pub anchor: IVec3,
    pub vertex_count: u32,
    pub index_count: u32,
    pub transparent_index_count: u32,
    vertices: Option<PooledBuffer>,
    opaque: Option<PooledBuffer>,
    transparent: Option<PooledBuffer>,
}

impl GpuChunkMesh {
    pub fn total_gpu_bytes(&self) -> u64 {
        [&self.vertices, &self.opaque, &self.transparent]
            .into_iter()
            .flatten()
            .map(PooledBuffer::size)
            .sum()
    }

    /// Draw the opaque faces.
    pub fn draw_opaque(&self, render_pass: &mut wgpu::RenderPass<'_>) {
        self.draw(render_pass, self.opaque.as_ref(), self.index_count);
    }

    /// Draw the water faces; call after every opaque mesh.
    pub fn draw_transparent(&self, render_pass: &mut wgpu::RenderPass<'_>) {
        self.draw(render_pass, self.transparent.as_ref(), self.transparent_index_count);
    }

    fn draw(&self, render_pass: &mut wgpu::RenderPass<'_>, indices: Option<&PooledBuffer>, count: u32) {
        let (Some(vertices), Some(indices)) = (&self.vertices, indices) else {
            return;
        };
        render_pass.set_vertex_buffer(0, vertices.buffer.slice(..));
        render_pass.set_index_buffer(indices.buffer.slice(..), wgpu::IndexFormat::Uint32);
        render_pass.draw_indexed(0..count, 0, 0..1);
    }
}

/// [`MeshSink`] writing contour output into pooled GPU buffers.
pub struct GpuMeshSink {
    context: GpuContext,
    pool: GpuBufferPool,
    meshes: FxHashMap<MeshHandle, GpuChunkMesh>,
    next_handle: u64,
}

impl GpuMeshSink {
    /// Size classes are chosen to hold the largest mesh `layout` can produce.
    pub fn new(context: GpuContext, layout: &BufferLayout) -> Self {
        let vertex_bytes = (layout.max_vertices() * std::mem::size_of::<ChunkVertex>()) as u64;
        let index_bytes = (layout.max_indices() * std::mem::size_of::<u32>()) as u64;
        Self {
            context,
            pool: GpuBufferPool::new(vertex_bytes.max(index_bytes)),
            meshes: FxHashMap::default(),
            next_handle: 0,
        }
    }

    pub fn context(&self) -> &GpuContext {
        &self.context
    }

    pub fn pool(&self) -> &GpuBufferPool {
        &self.pool
    }

    pub fn live(&self) -> usize {
        self.meshes.len()
    }

    pub fn mesh(&self, handle: MeshHandle) -> Option<&GpuChunkMesh> {
        self.meshes.get(&handle)
    }

    pub fn meshes(&self) -> impl Iterator<Item = &GpuChunkMesh> {
        self.meshes.values()
    }

    /// Submit staged buffer writes.
    pub fn flush(&self) {
        self.context.queue.submit(std::iter::empty());
    }

    fn write(&mut self, kind: BufferKind, bytes: &[u8]) -> Option<PooledBuffer> {
        if bytes.is_empty() {
            return None;
        }
        let pooled = self.pool.acquire(&self.context.device, kind, bytes.len() as u64);
        self.context.queue.write_buffer(&pooled.buffer, 0, bytes);
        Some(pooled)
    }
}

impl MeshSink for GpuMeshSink {
    fn upload(&mut self, anchor: IVec3, buffer: &GenerationBuffer) -> MeshHandle {
        let vertices = interleave(buffer);
        let mesh = GpuChunkMesh {
            anchor,
            vertex_count: vertices.len() as u32,
            index_count: buffer.indices.len() as u32,
            transparent_index_count: buffer.transparent_indices.len() as u32,
            vertices: self.write(BufferKind::Vertex, bytemuck::cast_slice(&vertices)),
            opaque: self.write(BufferKind::Index, bytemuck::cast_slice(&buffer.indices)),
            transparent: self.write(
                BufferKind::Index,
                bytemuck::cast_slice(&buffer.transparent_indices),
            ),
        };
        let handle = MeshHandle(self.next_handle);
        self.next_handle += 1;
        log::trace!(
            "chunk {anchor} uploaded as mesh {}: {} vertices, {} bytes",
            handle.0,
            mesh.vertex_count,
            mesh.total_gpu_bytes()
        );
        self.meshes.insert(handle, mesh);
        handle
    }

    fn unrender(&mut self, handle: MeshHandle) {
        let Some(mesh) = self.meshes.remove(&handle) else {
            log::warn!("unrender of unknown mesh {}", handle.0);
            return;
        };
        for pooled in [mesh.vertices, mesh.opaque, mesh.transparent].into_iter().flatten() {
            self.pool.release(pooled);
        }
    }
}

impl Drop for GpuMeshSink {
    fn drop(&mut self) {
        let handles: Vec<_> = self.meshes.keys().copied().collect();
        for handle in handles {
            self.unrender(handle);
        }
        self.pool.clear();
    }
}

#[cfg(test)]
mod tests {
    use terra_generation::BufferPool;

    use super::*;
    use crate::test_support::test_context;

    fn quad_buffer(pool: &BufferPool, water: bool) -> GenerationBuffer {
        let mut buffer = pool.acquire().unwrap();
        buffer.vertices.extend([[0.0, 1.0, 0.0], [1.0, 1.0, 0.0], [1.0, 1.0, 1.0], [0.0, 1.0, 1.0]]);
        buffer.normals.extend([[0.0, 1.0, 0.0]; 4]);
        buffer.colors.extend([[0.3, 0.6, 0.2, 1.0]; 4]);
        let quad = [0, 1, 2, 0, 2, 3];
        if water {
            buffer.transparent_indices.extend(quad);
        } else {
            buffer.indices.extend(quad);
        }
        buffer
    }

    #[test]
    fn test_upload_writes_only_present_streams() {
        let Some(gpu) = test_context() else {
            return;
        };
        let layout = BufferLayout::new(4, 1);
        let pool = BufferPool::new(layout);
        let mut sink = GpuMeshSink::new(gpu, &layout);

        let handle = sink.upload(IVec3::new(4, 0, 8), &quad_buffer(&pool, false));
        sink.flush();
        let mesh = sink.mesh(handle).unwrap();
        assert_eq!(mesh.vertex_count, 4);
        assert_eq!(mesh.index_count, 6);
        assert_eq!(mesh.transparent_index_count, 0);
        assert!(mesh.transparent.is_none());
        assert_eq!(sink.live(), 1);
    }

    #[test]
    fn test_remesh_reuses_released_buffers() {
        let Some(gpu) = test_context() else {
            return;
        };
        let layout = BufferLayout::new(4, 1);
        let pool = BufferPool::new(layout);
        let mut sink = GpuMeshSink::new(gpu, &layout);

        let first = sink.upload(IVec3::ZERO, &quad_buffer(&pool, true));
        let allocated = sink.pool().gpu_memory_allocated();
        sink.unrender(first);
        assert_eq!(sink.live(), 0);
        assert_eq!(sink.pool().gpu_memory_in_use(), 0);

        let second = sink.upload(IVec3::ZERO, &quad_buffer(&pool, true));
        assert_ne!(first, second);
        assert_eq!(sink.pool().gpu_memory_allocated(), allocated);
        assert!(sink.mesh(second).unwrap().total_gpu_bytes() > 0);
    }
}
