//! Issues generation stages and tracks the buffers they hold.

use std::time::Duration;

use crossbeam_channel::{Receiver, unbounded};
use glam::IVec3;
use tracing::trace;

use terra_generation::{
    BackendError, BufferPool, CompletionSender, ComputeBackend, Dispatch, GenerationBuffer,
    PoolError, Stage, StageCompletion, ThreadGroups, Ticket,
};

/// A stage the backend refused or failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFailure {
    pub stage: Stage,
    pub error: BackendError,
}

/// Why a generation could not start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartFailure {
    Pool(PoolError),
    Rejected(StageFailure),
}

/// Density -> height readback -> contour chain over pooled buffers.
///
/// Every buffer checked out by [`GenerationPipeline::start`] is counted as
/// in flight until it is handed to [`GenerationPipeline::finish`].
pub struct GenerationPipeline {
    backend: Box<dyn ComputeBackend>,
    pool: BufferPool,
    groups: ThreadGroups,
    reply: CompletionSender,
    completions: Receiver<StageCompletion>,
    next_ticket: u64,
    in_flight: usize,
}

impl GenerationPipeline {
    pub fn new(backend: Box<dyn ComputeBackend>, pool: BufferPool) -> Self {
        let (reply, completions) = unbounded();
        let groups = pool.layout().thread_groups();
        Self {
            backend,
            pool,
            groups,
            reply,
            completions,
            next_ticket: 0,
            in_flight: 0,
        }
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Buffers currently owned by in-flight stages.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Check out a buffer and dispatch the density stage for `anchor`.
    pub fn start(&mut self, anchor: IVec3) -> Result<Ticket, StartFailure> {
        let buffer = self.pool.acquire().map_err(StartFailure::Pool)?;
        let ticket = Ticket(self.next_ticket);
        self.next_ticket += 1;

        let dispatch = self.dispatch(ticket, anchor, buffer);
        match self.backend.execute_density(dispatch) {
            Ok(()) => {
                self.in_flight += 1;
                trace!(?anchor, ticket = ticket.0, "density dispatched");
                Ok(ticket)
            }
            Err(rejected) => {
                self.pool.release(rejected.buffer);
                Err(StartFailure::Rejected(StageFailure {
                    stage: Stage::Density,
                    error: rejected.error,
                }))
            }
        }
    }

    /// Hand a completed stage's buffer to the next stage.
    ///
    /// On rejection the buffer goes back to the pool and the attempt ends.
    pub fn advance(
        &mut self,
        ticket: Ticket,
        anchor: IVec3,
        buffer: GenerationBuffer,
        next: Stage,
    ) -> Result<(), StageFailure> {
        let dispatch = self.dispatch(ticket, anchor, buffer);
        let result = match next {
            Stage::Density => self.backend.execute_density(dispatch),
            Stage::HeightReadback => self.backend.read_back_heights(dispatch),
            Stage::Contour => self.backend.contour(dispatch),
        };
        result.map_err(|rejected| {
            self.finish(rejected.buffer);
            StageFailure {
                stage: next,
                error: rejected.error,
            }
        })
    }

    /// End an attempt, returning its buffer to the pool.
    pub fn finish(&mut self, buffer: GenerationBuffer) {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.pool.release(buffer);
    }

    pub fn try_completion(&self) -> Option<StageCompletion> {
        self.completions.try_recv().ok()
    }

    pub fn wait_completion(&self, timeout: Duration) -> Option<StageCompletion> {
        self.completions.recv_timeout(timeout).ok()
    }

    fn dispatch(&self, ticket: Ticket, anchor: IVec3, buffer: GenerationBuffer) -> Dispatch {
        Dispatch {
            ticket,
            anchor,
            groups: self.groups,
            buffer,
            reply: self.reply.clone(),
        }
    }
}
