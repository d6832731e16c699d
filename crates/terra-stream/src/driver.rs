//! Main-thread executor of scanner decisions and generation completions.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use glam::IVec3;
use rustc_hash::FxHashSet;
use tracing::{debug, error, info, trace, trace_span, warn};

use terra_config::StreamingConfig;
use terra_generation::{
    BackendError, BufferPool, ChunkSummary, GenerationBuffer, MeshSink, Stage, StageCompletion,
    Ticket,
};
use terra_octree::{CellStats, Octree, OctreeNode};

use crate::error::StreamError;
use crate::pipeline::{GenerationPipeline, StageFailure, StartFailure};
use crate::scanner::{ScanReceivers, ScanShared};
use crate::slot::{ChunkSlot, GenerationState, Residency, residency_of};
use crate::stats::{StreamStats, TickReport};

/// How long shutdown waits for outstanding stages before giving up on them.
const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

enum Eviction {
    Done,
    Deferred,
    Skipped,
}

/// Owns the octree and applies all lifecycle transitions.
///
/// Call [`StreamingDriver::tick`] once per frame. Each tick does a bounded
/// amount of work: pending root expansions, up to
/// `max_completions_per_frame` stage completions, up to
/// `max_materializations_per_frame` new slots, up to
/// `max_evictions_per_frame` evictions, up to `max_regenerations_per_frame`
/// regenerations, and up to
/// `max_generation_starts_per_frame` new generations.
pub struct StreamingDriver<S: MeshSink> {
    tree: Octree<ChunkSlot>,
    shared: Arc<ScanShared>,
    receivers: ScanReceivers,
    pipeline: GenerationPipeline,
    sink: S,
    budgets: StreamingConfig,
    pending: VecDeque<IVec3>,
    deferred_evictions: VecDeque<IVec3>,
    deferred_queued: FxHashSet<IVec3>,
    regenerate: VecDeque<IVec3>,
    regenerate_queued: FxHashSet<IVec3>,
    stats: StreamStats,
}

impl<S: MeshSink> StreamingDriver<S> {
    pub fn new(
        tree: Octree<ChunkSlot>,
        shared: Arc<ScanShared>,
        receivers: ScanReceivers,
        pipeline: GenerationPipeline,
        sink: S,
        budgets: StreamingConfig,
    ) -> Self {
        Self {
            tree,
            shared,
            receivers,
            pipeline,
            sink,
            budgets,
            pending: VecDeque::new(),
            deferred_evictions: VecDeque::new(),
            deferred_queued: FxHashSet::default(),
            regenerate: VecDeque::new(),
            regenerate_queued: FxHashSet::default(),
            stats: StreamStats::default(),
        }
    }

    pub fn tree(&self) -> &Octree<ChunkSlot> {
        &self.tree
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    pub fn pool(&self) -> &BufferPool {
        self.pipeline.pool()
    }

    pub fn in_flight(&self) -> usize {
        self.pipeline.in_flight()
    }

    pub fn pending_generations(&self) -> usize {
        self.pending.len()
    }

    pub fn deferred_evictions(&self) -> usize {
        self.deferred_evictions.len()
    }

    /// Residency of the leaf anchored at `anchor`.
    pub fn residency(&self, anchor: IVec3) -> Residency {
        self.tree
            .find_leaf(anchor)
            .filter(|leaf| leaf.anchor() == anchor)
            .map_or(Residency::Unallocated, residency_of)
    }

    pub fn slot(&self, anchor: IVec3) -> Option<&ChunkSlot> {
        self.tree
            .find_leaf(anchor)
            .filter(|leaf| leaf.anchor() == anchor)
            .and_then(OctreeNode::chunk)
    }

    /// Anchors of every leaf carrying a slot.
    pub fn allocated_anchors(&self) -> FxHashSet<IVec3> {
        let mut anchors = FxHashSet::default();
        self.tree.for_each_leaf(|leaf| {
            if let Some(slot) = leaf.chunk() {
                anchors.insert(slot.anchor());
            }
        });
        anchors
    }

    /// Ask for the leaf at `anchor` to be rebuilt from current voxel data.
    pub fn request_regeneration(&mut self, anchor: IVec3) {
        if self.regenerate_queued.insert(anchor) {
            self.regenerate.push_back(anchor);
        }
    }

    pub fn refresh_aggregates(&mut self) -> CellStats {
        self.tree.aggregate()
    }

    pub fn tick(&mut self) -> Result<TickReport, StreamError> {
        let _span = trace_span!("stream_tick").entered();
        let mut report = TickReport::default();

        self.process_expansions(&mut report)?;
        self.process_completions(&mut report)?;
        self.process_materializations(&mut report);
        self.process_evictions(&mut report);
        self.process_regenerations(&mut report);
        self.start_generations(&mut report)?;

        if !report.is_idle() {
            trace!(?report, "tick");
        }
        Ok(report)
    }

    fn process_expansions(&mut self, report: &mut TickReport) -> Result<(), StreamError> {
        while let Ok(request) = self.receivers.expand.try_recv() {
            if self.tree.contains_circle(request.center, request.radius) {
                self.stats.stale_requests += 1;
                continue;
            }
            let version = self.tree.version();
            let expanded = self.tree.expand_to_contain(
                request.center,
                request.radius,
                self.budgets.max_root_expansions,
            );
            if self.tree.version() != version {
                self.shared.publish_topology(self.tree.skeleton());
            }
            let steps = expanded?;
            self.stats.root_expansions += u64::from(steps);
            report.expansions += steps;
            info!(
                steps,
                bounds = ?self.tree.bounds(),
                leaves = self.tree.leaf_count(),
                "octree root expanded"
            );
        }
        Ok(())
    }

    fn process_completions(&mut self, report: &mut TickReport) -> Result<(), StreamError> {
        for _ in 0..self.budgets.max_completions_per_frame {
            let Some(completion) = self.pipeline.try_completion() else {
                break;
            };
            report.completions += 1;
            self.handle_completion(completion, report)?;
        }
        Ok(())
    }

    fn handle_completion(
        &mut self,
        completion: StageCompletion,
        report: &mut TickReport,
    ) -> Result<(), StreamError> {
        let StageCompletion {
            ticket,
            anchor,
            stage,
            buffer,
            result,
        } = completion;

        let current = self
            .slot(anchor)
            .is_some_and(|slot| slot.generation() == GenerationState::Generating(ticket));
        if !current {
            trace!(?anchor, ticket = ticket.0, %stage, "completion for abandoned attempt");
            self.pipeline.finish(buffer);
            self.stats.stale_requests += 1;
            return Ok(());
        }

        if let Err(error) = result {
            self.pipeline.finish(buffer);
            return self.fail(anchor, StageFailure { stage, error });
        }

        if !self.shared.is_wanted(anchor) {
            // Evicted in the meantime; the deferred eviction disposes the slot.
            self.pipeline.finish(buffer);
            self.set_generation(anchor, GenerationState::Idle);
            self.stats.stale_requests += 1;
            return Ok(());
        }

        match stage {
            Stage::Density if buffer.counts.is_empty() => {
                self.pipeline.finish(buffer);
                self.release_empty(anchor);
                Ok(())
            }
            Stage::Density => self.continue_with(ticket, anchor, buffer, Stage::HeightReadback),
            Stage::HeightReadback => {
                let summary = ChunkSummary::from_buffer(&buffer, anchor);
                if let Some(slot) = self.slot_mut(anchor) {
                    slot.summary = Some(summary);
                }
                self.continue_with(ticket, anchor, buffer, Stage::Contour)
            }
            Stage::Contour => {
                self.upload(anchor, &buffer);
                self.pipeline.finish(buffer);
                report.uploads += 1;
                Ok(())
            }
        }
    }

    fn continue_with(
        &mut self,
        ticket: Ticket,
        anchor: IVec3,
        buffer: GenerationBuffer,
        next: Stage,
    ) -> Result<(), StreamError> {
        match self.pipeline.advance(ticket, anchor, buffer, next) {
            Ok(()) => Ok(()),
            Err(failure) if failure.error == BackendError::Busy => {
                self.back_off(anchor, failure.stage);
                Ok(())
            }
            Err(failure) => self.fail(anchor, failure),
        }
    }

    /// A dispatch refused as busy never ran: requeue the chunk at the front
    /// without counting a failed attempt.
    fn back_off(&mut self, anchor: IVec3, stage: Stage) {
        self.set_generation(anchor, GenerationState::Idle);
        self.pending.push_front(anchor);
        self.stats.backpressure += 1;
        debug!(?anchor, %stage, "compute backend busy; chunk requeued");
    }

    /// The chunk holds nothing to draw: drop the slot without contouring.
    fn release_empty(&mut self, anchor: IVec3) {
        let Some(slot) = self.leaf_mut(anchor).and_then(OctreeNode::take_chunk) else {
            return;
        };
        if let Some(handle) = slot.mesh {
            self.sink.unrender(handle);
        }
        self.stats.empty_chunks += 1;
        debug!(?anchor, "empty chunk released after density");
    }

    fn upload(&mut self, anchor: IVec3, buffer: &GenerationBuffer) {
        let handle = self.sink.upload(anchor, buffer);
        let Some(slot) = self
            .tree
            .find_leaf_mut(anchor)
            .and_then(OctreeNode::chunk_mut)
        else {
            self.sink.unrender(handle);
            return;
        };
        let replaced = slot.mesh.replace(handle);
        slot.residency = Residency::Idle;
        slot.generation = GenerationState::Idle;
        slot.failures = 0;
        if let Some(old) = replaced {
            self.sink.unrender(old);
        }
        self.stats.uploads += 1;
        trace!(?anchor, handle = handle.0, "chunk mesh uploaded");
    }

    /// Record a stage that ran and failed, or a non-transient rejection:
    /// requeue once if retryable, otherwise surface it.
    fn fail(&mut self, anchor: IVec3, failure: StageFailure) -> Result<(), StreamError> {
        let StageFailure { stage, error } = failure;
        let Some(slot) = self.slot_mut(anchor) else {
            return Ok(());
        };
        slot.generation = GenerationState::Idle;

        if !error.is_retryable() {
            error!(?anchor, %stage, %error, "compute backend failure");
            return Err(StreamError::Backend {
                anchor,
                stage,
                source: error,
            });
        }
        slot.failures += 1;
        if slot.failures > 1 {
            error!(?anchor, %stage, %error, "chunk generation failed twice");
            return Err(StreamError::GenerationFailed {
                anchor,
                stage,
                source: error,
            });
        }
        warn!(?anchor, %stage, %error, "generation stage failed; retrying once");
        self.stats.retries += 1;
        self.pending.push_back(anchor);
        Ok(())
    }

    fn process_materializations(&mut self, report: &mut TickReport) {
        for _ in 0..self.budgets.max_materializations_per_frame {
            let Ok(anchor) = self.receivers.materialize.try_recv() else {
                break;
            };
            if !self.shared.is_wanted(anchor) {
                self.stats.stale_requests += 1;
                continue;
            }
            let Some(slot) = self.leaf_mut(anchor).and_then(OctreeNode::slot_mut) else {
                warn!(?anchor, "materialize request for unknown leaf");
                self.stats.stale_requests += 1;
                continue;
            };
            if let Some(existing) = slot {
                // Left and re-entered range while generating.
                if existing.needs_generation() {
                    self.pending.push_back(anchor);
                }
                continue;
            }
            *slot = Some(ChunkSlot::new(anchor));
            self.pending.push_back(anchor);
            self.stats.materializations += 1;
            report.materialized += 1;
        }
    }

    /// Dispose slots the scanner no longer wants.
    ///
    /// Deferred anchors are re-checked every frame but only charged against
    /// `max_evictions_per_frame` once they are actually disposed, so a
    /// backlog of slots that are still generating cannot starve fresh
    /// requests. Every request read from the scanner queue is charged.
    fn process_evictions(&mut self, report: &mut TickReport) {
        let mut budget = self.budgets.max_evictions_per_frame;

        for _ in 0..self.deferred_evictions.len() {
            let Some(anchor) = self.deferred_evictions.pop_front() else {
                break;
            };
            if budget == 0 {
                self.deferred_evictions.push_back(anchor);
                continue;
            }
            match self.evict(anchor) {
                Eviction::Deferred => self.deferred_evictions.push_back(anchor),
                Eviction::Done => {
                    budget -= 1;
                    report.evicted += 1;
                    self.deferred_queued.remove(&anchor);
                }
                Eviction::Skipped => {
                    self.deferred_queued.remove(&anchor);
                }
            }
        }

        while budget > 0 {
            let Ok(anchor) = self.receivers.evict.try_recv() else {
                break;
            };
            budget -= 1;
            if self.deferred_queued.contains(&anchor) {
                continue;
            }
            match self.evict(anchor) {
                Eviction::Done => report.evicted += 1,
                Eviction::Deferred => {
                    self.deferred_queued.insert(anchor);
                    self.deferred_evictions.push_back(anchor);
                    self.stats.deferrals += 1;
                    report.deferred += 1;
                    debug!(?anchor, "eviction deferred until generation completes");
                }
                Eviction::Skipped => {}
            }
        }
    }

    fn evict(&mut self, anchor: IVec3) -> Eviction {
        if self.shared.is_wanted(anchor) {
            // Re-entered range before this request was processed.
            self.stats.stale_requests += 1;
            return Eviction::Skipped;
        }
        let Some(leaf) = self
            .tree
            .find_leaf_mut(anchor)
            .filter(|leaf| leaf.anchor() == anchor)
        else {
            return Eviction::Skipped;
        };
        match leaf.chunk() {
            None => Eviction::Skipped,
            Some(slot) if slot.is_generating() => Eviction::Deferred,
            Some(_) => {
                if let Some(handle) = leaf.take_chunk().and_then(|slot| slot.mesh) {
                    self.sink.unrender(handle);
                }
                self.stats.evictions += 1;
                Eviction::Done
            }
        }
    }

    /// Restart up to `max_regenerations_per_frame` edited chunks. Requests
    /// for chunks that are mid-generation wait for a later frame.
    fn process_regenerations(&mut self, report: &mut TickReport) {
        let budget = self.budgets.max_regenerations_per_frame as u32;
        let mut requeue = Vec::new();
        for _ in 0..self.regenerate.len() {
            if report.regenerated >= budget {
                break;
            }
            let Some(anchor) = self.regenerate.pop_front() else {
                break;
            };
            self.regenerate_queued.remove(&anchor);
            if !self.shared.is_wanted(anchor) {
                continue;
            }
            let Some(slot) = self.leaf_mut(anchor).and_then(OctreeNode::slot_mut) else {
                continue;
            };
            match slot {
                // Released as empty earlier; the edit may have filled it.
                None => *slot = Some(ChunkSlot::new(anchor)),
                Some(chunk) if chunk.is_generating() => {
                    requeue.push(anchor);
                    continue;
                }
                Some(chunk) if chunk.residency == Residency::Idle => {
                    chunk.residency = Residency::WaitingToMesh;
                }
                Some(_) => continue,
            }
            self.pending.push_back(anchor);
            self.stats.regenerations += 1;
            report.regenerated += 1;
        }
        for anchor in requeue {
            self.request_regeneration(anchor);
        }
    }

    fn start_generations(&mut self, report: &mut TickReport) -> Result<(), StreamError> {
        let mut attempts = self.pending.len();
        while report.started < self.budgets.max_generation_starts_per_frame as u32 && attempts > 0 {
            attempts -= 1;
            let Some(anchor) = self.pending.pop_front() else {
                break;
            };
            if !self.shared.is_wanted(anchor)
                || !self.slot(anchor).is_some_and(ChunkSlot::needs_generation)
            {
                continue;
            }

            match self.pipeline.start(anchor) {
                Ok(ticket) => {
                    self.set_generation(anchor, GenerationState::Generating(ticket));
                    report.started += 1;
                }
                Err(StartFailure::Pool(pool_error)) if pool_error.is_retryable() => {
                    warn!(?anchor, %pool_error, "generation buffer unavailable; retrying next frame");
                    self.pending.push_front(anchor);
                    break;
                }
                Err(StartFailure::Pool(pool_error)) => return Err(pool_error.into()),
                Err(StartFailure::Rejected(failure)) if failure.error == BackendError::Busy => {
                    self.back_off(anchor, failure.stage);
                    break;
                }
                Err(StartFailure::Rejected(failure)) => self.fail(anchor, failure)?,
            }
        }
        Ok(())
    }

    /// Stop issuing work, wait for outstanding stages, unrender every mesh and
    /// dispose the pool. Returns the number of disposed buffers.
    pub fn shutdown(&mut self) -> usize {
        let deadline = Instant::now() + SHUTDOWN_DRAIN_TIMEOUT;
        while self.pipeline.in_flight() > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.pipeline.wait_completion(remaining) {
                Some(completion) => self.pipeline.finish(completion.buffer),
                None => {
                    warn!(
                        in_flight = self.pipeline.in_flight(),
                        "generation stages still outstanding at shutdown"
                    );
                    break;
                }
            }
        }

        let sink = &mut self.sink;
        let mut released = 0;
        self.tree.for_each_leaf_mut(|leaf| {
            if let Some(slot) = leaf.take_chunk() {
                if let Some(handle) = slot.mesh {
                    sink.unrender(handle);
                }
                released += 1;
            }
        });
        self.pending.clear();
        self.deferred_evictions.clear();
        self.deferred_queued.clear();
        self.regenerate.clear();
        self.regenerate_queued.clear();

        let disposed = self.pipeline.pool().shutdown();
        info!(released, disposed, stats = %self.stats, "streaming driver shut down");
        disposed
    }

    fn leaf_mut(&mut self, anchor: IVec3) -> Option<&mut OctreeNode<ChunkSlot>> {
        self.tree
            .find_leaf_mut(anchor)
            .filter(|leaf| leaf.anchor() == anchor)
    }

    fn slot_mut(&mut self, anchor: IVec3) -> Option<&mut ChunkSlot> {
        self.leaf_mut(anchor).and_then(OctreeNode::chunk_mut)
    }

    fn set_generation(&mut self, anchor: IVec3, state: GenerationState) {
        if let Some(slot) = self.slot_mut(anchor) {
            slot.generation = state;
        }
    }
}
