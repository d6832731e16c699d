//! wgpu destination for generated chunk meshes: a headless device context,
//! size-classed buffer reuse and a [`terra_generation::MeshSink`] that keeps
//! every resident chunk's geometry on the GPU.

pub mod context;
pub mod pool;
pub mod sink;
pub mod vertex;

pub use context::{GpuContext, RenderError};
pub use pool::{BufferKind, GpuBufferPool, PooledBuffer};
pub use sink::{GpuChunkMesh, GpuMeshSink};
pub use vertex::{ChunkVertex, interleave};

#[cfg(test)]
pub(crate) mod test_support {
    use crate::GpuContext;

    /// A device when the machine has an adapter; tests skip otherwise.
    pub fn test_context() -> Option<GpuContext> {
        GpuContext::new_blocking().ok()
    }
}
