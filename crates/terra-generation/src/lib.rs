//! Generation resources and the contracts around the compute stages.
//!
//! A chunk is generated in three asynchronous stages (density, height
//! readback, contouring) executed by a [`ComputeBackend`] on a pooled
//! [`GenerationBuffer`]. Each stage reports back through a
//! [`StageCompletion`] carrying the buffer, so a buffer is only ever owned
//! by the pool or by exactly one in-flight operation. Finished geometry is
//! handed to a [`MeshSink`].
//!
//! [`CpuBackend`] is a host implementation of the stages running on worker
//! threads; it is used by the demo and by integration tests.

mod backend;
mod buffer;
pub mod cpu;
mod layout;
mod pool;
mod sink;
mod summary;

pub use backend::{
    BackendError, CompletionSender, ComputeBackend, Dispatch, DispatchError, Stage,
    StageCompletion, Ticket,
};
pub use buffer::{BufferId, GenerationBuffer, GenerationCounts};
pub use cpu::CpuBackend;
pub use layout::{BufferLayout, ThreadGroups, WORKGROUP_SIZE};
pub use pool::{BufferPool, PoolError};
pub use sink::{HostMeshSink, MeshHandle, MeshSink};
pub use summary::ChunkSummary;
