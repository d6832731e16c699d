//! Destination for finished chunk geometry.

use glam::IVec3;
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::buffer::GenerationBuffer;

/// Opaque handle to uploaded geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshHandle(pub u64);

/// Receives meshes built by the contour stage.
pub trait MeshSink {
    /// Copy the mesh output of `buffer` and return a handle to it. The buffer
    /// returns to the pool right after this call.
    fn upload(&mut self, anchor: IVec3, buffer: &GenerationBuffer) -> MeshHandle;

    /// Stop drawing and free the geometry behind `handle`.
    fn unrender(&mut self, handle: MeshHandle);
}

/// Per-mesh bookkeeping kept by [`HostMeshSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostMesh {
    pub anchor: IVec3,
    pub vertices: usize,
    pub indices: usize,
    pub transparent_indices: usize,
}

/// In-memory sink that tracks mesh sizes without a renderer.
#[derive(Debug, Default)]
pub struct HostMeshSink {
    meshes: FxHashMap<MeshHandle, HostMesh>,
    next_handle: u64,
    uploads: u64,
}

impl HostMeshSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Meshes currently live.
    pub fn live(&self) -> usize {
        self.meshes.len()
    }

    /// Uploads ever performed.
    pub fn uploads(&self) -> u64 {
        self.uploads
    }

    pub fn mesh(&self, handle: MeshHandle) -> Option<&HostMesh> {
        self.meshes.get(&handle)
    }

    /// Live meshes for a given chunk anchor.
    pub fn meshes_at(&self, anchor: IVec3) -> usize {
        self.meshes.values().filter(|m| m.anchor == anchor).count()
    }

    pub fn total_vertices(&self) -> usize {
        self.meshes.values().map(|m| m.vertices).sum()
    }
}

impl MeshSink for HostMeshSink {
    fn upload(&mut self, anchor: IVec3, buffer: &GenerationBuffer) -> MeshHandle {
        let handle = MeshHandle(self.next_handle);
        self.next_handle += 1;
        self.uploads += 1;
        self.meshes.insert(
            handle,
            HostMesh {
                anchor,
                vertices: buffer.vertices.len(),
                indices: buffer.indices.len(),
                transparent_indices: buffer.transparent_indices.len(),
            },
        );
        trace!(?anchor, handle = handle.0, "mesh stored");
        handle
    }

    fn unrender(&mut self, handle: MeshHandle) {
        self.meshes.remove(&handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BufferPool;
    use crate::layout::BufferLayout;

    #[test]
    fn test_upload_and_unrender() {
        let pool = BufferPool::new(BufferLayout::new(4, 1));
        let mut buffer = pool.acquire().unwrap();
        buffer.vertices.extend([[0.0; 3]; 4]);
        buffer.indices.extend([0, 1, 2, 0, 2, 3]);

        let mut sink = HostMeshSink::new();
        let a = sink.upload(IVec3::ZERO, &buffer);
        let b = sink.upload(IVec3::new(4, 0, 0), &buffer);
        assert_ne!(a, b);
        assert_eq!(sink.live(), 2);
        assert_eq!(sink.mesh(a).unwrap().indices, 6);
        assert_eq!(sink.total_vertices(), 8);

        sink.unrender(a);
        assert_eq!(sink.live(), 1);
        assert_eq!(sink.meshes_at(IVec3::ZERO), 0);
        assert_eq!(sink.uploads(), 2);
    }
}
