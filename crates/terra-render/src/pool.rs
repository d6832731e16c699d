//! Reuse of GPU buffers across chunk uploads.
//!
//! Chunk meshes are remeshed and evicted constantly while the viewpoint
//! moves. [`GpuBufferPool`] keeps released buffers in power-of-two size
//! classes so an upload usually writes into an existing allocation.

use std::fmt;

/// Smallest size class in bytes.
pub const MIN_CLASS_BYTES: u64 = 4096;

/// What a pooled buffer is bound as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Vertex,
    Index,
}

impl BufferKind {
    fn usage(self) -> wgpu::BufferUsages {
        match self {
            BufferKind::Vertex => wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            BufferKind::Index => wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
        }
    }

    fn label(self) -> &'static str {
        match self {
            BufferKind::Vertex => "pooled_chunk_vertex_buffer",
            BufferKind::Index => "pooled_chunk_index_buffer",
        }
    }

    fn slot(self) -> usize {
        match self {
            BufferKind::Vertex => 0,
            BufferKind::Index => 1,
        }
    }
}

/// A buffer checked out of a [`GpuBufferPool`].
pub struct PooledBuffer {
    pub buffer: wgpu::Buffer,
    kind: BufferKind,
    class: usize,
}

impl PooledBuffer {
    pub fn kind(&self) -> BufferKind {
        self.kind
    }

    pub fn class(&self) -> usize {
        self.class
    }

    pub fn size(&self) -> u64 {
        self.buffer.size()
    }
}

impl fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("kind", &self.kind)
            .field("class", &self.class)
            .field("size", &self.size())
            .finish()
    }
}

/// Free GPU buffers bucketed by kind and size class.
///
/// Class `i` holds buffers of `MIN_CLASS_BYTES << i` bytes. Requests larger
/// than the top class get a dedicated exact-size buffer that is dropped on
/// release instead of pooled.
pub struct GpuBufferPool {
    /// `free[kind][class]`
    free: [Vec<Vec<wgpu::Buffer>>; 2],
    class_sizes: Vec<u64>,
    total_allocated: u64,
    in_use: u64,
}

impl GpuBufferPool {
    /// Pool whose classes reach at least `largest` bytes.
    pub fn new(largest: u64) -> Self {
        let mut class_sizes = vec![MIN_CLASS_BYTES];
        while class_sizes[class_sizes.len() - 1] < largest {
            let next = class_sizes[class_sizes.len() - 1] * 2;
            class_sizes.push(next);
        }
        let classes = class_sizes.len();
        let buckets = || (0..classes).map(|_| Vec::new()).collect::<Vec<_>>();
        Self {
            free: [buckets(), buckets()],
            class_sizes,
            total_allocated: 0,
            in_use: 0,
        }
    }

    pub fn class_count(&self) -> usize {
        self.class_sizes.len()
    }

    /// Smallest class holding `min_size` bytes, `None` past the top class.
    pub fn size_class_for(&self, min_size: u64) -> Option<usize> {
        self.class_sizes.iter().position(|&size| size >= min_size)
    }

    pub fn class_size(&self, class: usize) -> u64 {
        self.class_sizes[class.min(self.class_sizes.len() - 1)]
    }

    /// Check out a buffer of at least `min_size` bytes, reusing a free one
    /// of the same kind and class when available.
    pub fn acquire(&mut self, device: &wgpu::Device, kind: BufferKind, min_size: u64) -> PooledBuffer {
        let (class, size) = match self.size_class_for(min_size) {
            Some(class) => (class, self.class_sizes[class]),
            None => (self.class_sizes.len(), aligned(min_size)),
        };

        if let Some(buffer) = self.free[kind.slot()].get_mut(class).and_then(Vec::pop) {
            self.in_use += size;
            return PooledBuffer { buffer, kind, class };
        }

        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(kind.label()),
            size,
            usage: kind.usage(),
            mapped_at_creation: false,
        });
        self.total_allocated += size;
        self.in_use += size;
        if class == self.class_sizes.len() {
            log::debug!("oversized {kind:?} buffer of {size} bytes allocated outside the pool");
        }
        PooledBuffer { buffer, kind, class }
    }

    /// Return a buffer. Oversized buffers are destroyed.
    pub fn release(&mut self, pooled: PooledBuffer) {
        let size = pooled.size();
        self.in_use = self.in_use.saturating_sub(size);
        match self.free[pooled.kind.slot()].get_mut(pooled.class) {
            Some(bucket) => bucket.push(pooled.buffer),
            None => {
                self.total_allocated = self.total_allocated.saturating_sub(size);
                pooled.buffer.destroy();
            }
        }
    }

    /// Bytes held by checked-out buffers.
    pub fn gpu_memory_in_use(&self) -> u64 {
        self.in_use
    }

    /// Bytes allocated, pooled buffers included.
    pub fn gpu_memory_allocated(&self) -> u64 {
        self.total_allocated
    }

    pub fn free_count(&self, kind: BufferKind) -> usize {
        self.free[kind.slot()].iter().map(Vec::len).sum()
    }

    /// Destroy every free buffer.
    pub fn clear(&mut self) {
        for bucket in self.free.iter_mut().flatten() {
            for buffer in bucket.drain(..) {
                self.total_allocated = self.total_allocated.saturating_sub(buffer.size());
                buffer.destroy();
            }
        }
    }
}

fn aligned(size: u64) -> u64 {
    size.div_ceil(wgpu::COPY_BUFFER_ALIGNMENT) * wgpu::COPY_BUFFER_ALIGNMENT
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_context;

    #[test]
    fn test_classes_cover_largest_request() {
        let pool = GpuBufferPool::new(100_000);
        assert_eq!(pool.class_count(), 6);
        assert_eq!(pool.class_size(5), 131_072);
        assert_eq!(pool.size_class_for(1), Some(0));
        assert_eq!(pool.size_class_for(4096), Some(0));
        assert_eq!(pool.size_class_for(4097), Some(1));
        assert_eq!(pool.size_class_for(131_072), Some(5));
        assert_eq!(pool.size_class_for(131_073), None);
    }

    #[test]
    fn test_small_pool_has_one_class() {
        let pool = GpuBufferPool::new(10);
        assert_eq!(pool.class_count(), 1);
    }

    #[test]
    fn test_released_buffer_is_reused() {
        let Some(gpu) = test_context() else {
            return;
        };
        let mut pool = GpuBufferPool::new(65_536);
        let first = pool.acquire(&gpu.device, BufferKind::Vertex, 1000);
        let allocated = pool.gpu_memory_allocated();
        pool.release(first);
        assert_eq!(pool.free_count(BufferKind::Vertex), 1);
        assert_eq!(pool.gpu_memory_in_use(), 0);

        let _second = pool.acquire(&gpu.device, BufferKind::Vertex, 3000);
        assert_eq!(pool.gpu_memory_allocated(), allocated);
        assert_eq!(pool.free_count(BufferKind::Vertex), 0);
    }

    #[test]
    fn test_kinds_do_not_share_buffers() {
        let Some(gpu) = test_context() else {
            return;
        };
        let mut pool = GpuBufferPool::new(65_536);
        let vertex = pool.acquire(&gpu.device, BufferKind::Vertex, 100);
        pool.release(vertex);
        let index = pool.acquire(&gpu.device, BufferKind::Index, 100);
        assert_eq!(index.kind(), BufferKind::Index);
        assert_eq!(pool.free_count(BufferKind::Vertex), 1);
        assert_eq!(pool.gpu_memory_allocated(), 2 * MIN_CLASS_BYTES);
    }

    #[test]
    fn test_oversized_buffers_are_not_pooled() {
        let Some(gpu) = test_context() else {
            return;
        };
        let mut pool = GpuBufferPool::new(4096);
        let big = pool.acquire(&gpu.device, BufferKind::Index, 10_002);
        assert_eq!(big.size(), 10_004);
        pool.release(big);
        assert_eq!(pool.free_count(BufferKind::Index), 0);
        assert_eq!(pool.gpu_memory_allocated(), 0);
    }
}
