//! Compute backend contract for the three generation stages.

use std::fmt;

use crossbeam_channel::Sender;
use glam::IVec3;

use crate::buffer::GenerationBuffer;
use crate::layout::ThreadGroups;

/// Identifies one generation attempt. A new ticket is issued every time a
/// chunk starts generating, so completions of abandoned attempts can be
/// recognised and discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticket(pub u64);

/// Stages of a chunk generation, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Fill the voxel and height arrays and count solid voxels.
    Density,
    /// Copy the height map back to the host.
    HeightReadback,
    /// Build mesh output from the voxel array.
    Contour,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Density => "density",
            Stage::HeightReadback => "height readback",
            Stage::Contour => "contour",
        };
        f.write_str(name)
    }
}

/// Device-side failure of a stage.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The backend could not accept more work right now.
    #[error("compute backend is busy")]
    Busy,

    #[error("compute device lost: {0}")]
    DeviceLost(String),

    #[error("generation kernel failed to compile: {0}")]
    ShaderCompilation(String),

    /// The backend's workers are gone.
    #[error("compute backend disconnected")]
    Disconnected,
}

impl BackendError {
    /// Only transient saturation is worth a second attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BackendError::Busy)
    }
}

/// Channel on which stage completions are delivered.
pub type CompletionSender = Sender<StageCompletion>;

/// One stage invocation. The buffer travels with the dispatch and comes
/// back inside the [`StageCompletion`].
pub struct Dispatch {
    pub ticket: Ticket,
    /// Minimum corner of the leaf being generated.
    pub anchor: IVec3,
    pub groups: ThreadGroups,
    pub buffer: GenerationBuffer,
    pub reply: CompletionSender,
}

impl Dispatch {
    /// Send the buffer back with the stage outcome. Returns `false` when the
    /// receiving side is gone.
    pub fn complete(self, stage: Stage, result: Result<(), BackendError>) -> bool {
        let completion = StageCompletion {
            ticket: self.ticket,
            anchor: self.anchor,
            stage,
            buffer: self.buffer,
            result,
        };
        self.reply.send(completion).is_ok()
    }

    /// Refuse the dispatch synchronously, handing the buffer back to the caller.
    pub fn reject(self, stage: Stage, error: BackendError) -> DispatchError {
        DispatchError {
            stage,
            anchor: self.anchor,
            buffer: self.buffer,
            error,
        }
    }
}

impl fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatch")
            .field("ticket", &self.ticket)
            .field("anchor", &self.anchor)
            .field("buffer", &self.buffer.id())
            .finish_non_exhaustive()
    }
}

/// Outcome of a stage, delivered asynchronously.
#[derive(Debug)]
pub struct StageCompletion {
    pub ticket: Ticket,
    pub anchor: IVec3,
    pub stage: Stage,
    pub buffer: GenerationBuffer,
    pub result: Result<(), BackendError>,
}

/// A dispatch the backend refused to start.
#[derive(Debug, thiserror::Error)]
#[error("{stage} dispatch for chunk {anchor} rejected")]
pub struct DispatchError {
    pub stage: Stage,
    pub anchor: IVec3,
    /// Returned so the caller can put it back in the pool.
    pub buffer: GenerationBuffer,
    #[source]
    pub error: BackendError,
}

/// Executes generation stages on a buffer.
///
/// Every method either accepts the dispatch and later sends exactly one
/// [`StageCompletion`] on `dispatch.reply`, or returns the dispatch's
/// buffer immediately inside a [`DispatchError`].
pub trait ComputeBackend: Send + Sync {
    /// Evaluate terrain density for the leaf at `dispatch.anchor`, overlaying
    /// stored edits, and write the voxel array, height map and solid count.
    fn execute_density(&self, dispatch: Dispatch) -> Result<(), DispatchError>;

    /// Make the height map produced by the density stage readable on the host.
    fn read_back_heights(&self, dispatch: Dispatch) -> Result<(), DispatchError>;

    /// Build mesh geometry from the voxel array.
    fn contour(&self, dispatch: Dispatch) -> Result<(), DispatchError>;
}
