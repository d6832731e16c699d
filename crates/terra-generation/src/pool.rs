//! Growth-only pool of generation buffers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use crossbeam_channel::{Receiver, Sender, unbounded};
use tracing::debug;

use crate::buffer::{BufferId, GenerationBuffer};
use crate::layout::BufferLayout;

/// Errors from acquiring a generation buffer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// Allocating a new bundle failed. Retry on a later frame.
    #[error("failed to allocate {bytes} bytes for a dim {dim} generation buffer")]
    Exhausted { bytes: usize, dim: u32 },

    /// The pool was shut down.
    #[error("generation buffer pool is shut down")]
    Closed,
}

impl PoolError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, PoolError::Exhausted { .. })
    }
}

/// Concurrent pool of [`GenerationBuffer`]s.
///
/// `acquire` hands out a free buffer or allocates a new one; `release`
/// clears its counters and returns it. The total number of buffers only
/// grows until [`BufferPool::shutdown`]. Clones share the same pool, so
/// completion handlers on other threads can release into it.
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    layout: BufferLayout,
    free_sender: Sender<GenerationBuffer>,
    free_receiver: Receiver<GenerationBuffer>,
    allocated: AtomicUsize,
    next_id: AtomicU32,
    closed: AtomicBool,
}

impl BufferPool {
    pub fn new(layout: BufferLayout) -> Self {
        let (free_sender, free_receiver) = unbounded();
        Self {
            inner: Arc::new(PoolInner {
                layout,
                free_sender,
                free_receiver,
                allocated: AtomicUsize::new(0),
                next_id: AtomicU32::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Create a pool holding `count` ready buffers.
    pub fn with_prewarm(layout: BufferLayout, count: usize) -> Result<Self, PoolError> {
        let pool = Self::new(layout);
        pool.prewarm(count)?;
        Ok(pool)
    }

    /// Allocate `count` additional free buffers.
    pub fn prewarm(&self, count: usize) -> Result<(), PoolError> {
        for _ in 0..count {
            let buffer = self.allocate()?;
            let _ = self.inner.free_sender.send(buffer);
        }
        debug!(count, total = self.allocated(), "generation buffers pre-allocated");
        Ok(())
    }

    pub fn layout(&self) -> &BufferLayout {
        &self.inner.layout
    }

    /// Take a free buffer, allocating a new one when none is available.
    pub fn acquire(&self) -> Result<GenerationBuffer, PoolError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(PoolError::Closed);
        }
        if let Ok(mut buffer) = self.inner.free_receiver.try_recv() {
            buffer.reset_counters();
            return Ok(buffer);
        }
        let buffer = self.allocate()?;
        debug!(
            id = buffer.id().0,
            total = self.allocated(),
            "generation buffer pool grew"
        );
        Ok(buffer)
    }

    /// Return a buffer. After shutdown the buffer is dropped instead.
    pub fn release(&self, mut buffer: GenerationBuffer) {
        if self.inner.closed.load(Ordering::Acquire) {
            return;
        }
        buffer.reset_counters();
        let _ = self.inner.free_sender.send(buffer);
    }

    /// Buffers ever allocated by this pool.
    pub fn allocated(&self) -> usize {
        self.inner.allocated.load(Ordering::Relaxed)
    }

    /// Buffers currently free.
    pub fn available(&self) -> usize {
        self.inner.free_receiver.len()
    }

    /// Buffers checked out by in-flight work.
    pub fn in_use(&self) -> usize {
        self.allocated().saturating_sub(self.available())
    }

    /// Close the pool and dispose every free buffer. Returns how many were disposed.
    pub fn shutdown(&self) -> usize {
        self.inner.closed.store(true, Ordering::Release);
        let mut disposed = 0;
        while self.inner.free_receiver.try_recv().is_ok() {
            disposed += 1;
        }
        debug!(disposed, "generation buffer pool shut down");
        disposed
    }

    fn allocate(&self) -> Result<GenerationBuffer, PoolError> {
        let id = BufferId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let buffer = GenerationBuffer::allocate(id, self.inner.layout)?;
        self.inner.allocated.fetch_add(1, Ordering::Relaxed);
        Ok(buffer)
    }
}
