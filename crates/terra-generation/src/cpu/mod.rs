//! Host implementation of the generation stages on a worker pool.
//!
//! Dispatches are queued on a bounded channel and executed by named worker
//! threads; each finished stage is delivered on the dispatch's reply
//! channel exactly as a device backend would.

mod contour;
mod density;
mod terrain;

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use terra_config::WorldConfig;
use terra_voxel::VoxelStore;
use tracing::{debug, trace, warn};

pub use contour::material_color;
pub use terrain::{Terrain, TerrainParams};

use crate::backend::{BackendError, ComputeBackend, Dispatch, DispatchError, Stage};

/// Pending dispatches the queue holds before reporting [`BackendError::Busy`].
pub const QUEUE_CAPACITY: usize = 256;

struct Job {
    stage: Stage,
    dispatch: Dispatch,
}

/// Executes density, height readback and contouring on CPU threads.
pub struct CpuBackend {
    job_sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    in_flight: Arc<AtomicU64>,
}

impl CpuBackend {
    /// Spawn `threads` workers generating terrain for `world` with edits from `store`.
    pub fn new(world: &WorldConfig, store: VoxelStore, threads: usize) -> io::Result<Self> {
        Self::with_terrain(Terrain::new(TerrainParams::from_world(world)), store, threads)
    }

    /// One worker per core, leaving two for the frame and scanner threads.
    pub fn with_defaults(world: &WorldConfig, store: VoxelStore) -> io::Result<Self> {
        Self::new(world, store, default_thread_count())
    }

    pub fn with_terrain(terrain: Terrain, store: VoxelStore, threads: usize) -> io::Result<Self> {
        let (job_sender, job_receiver) = bounded::<Job>(QUEUE_CAPACITY);
        let terrain = Arc::new(terrain);
        let in_flight = Arc::new(AtomicU64::new(0));

        let mut workers = Vec::with_capacity(threads.max(1));
        for index in 0..threads.max(1) {
            let receiver = job_receiver.clone();
            let terrain = Arc::clone(&terrain);
            let store = store.clone();
            let in_flight = Arc::clone(&in_flight);
            let handle = std::thread::Builder::new()
                .name(format!("terra-cpu-backend-{index}"))
                .spawn(move || worker_loop(&receiver, &terrain, &store, &in_flight))?;
            workers.push(handle);
        }
        debug!(threads = workers.len(), "cpu generation backend started");

        Ok(Self {
            job_sender: Some(job_sender),
            workers,
            in_flight,
        })
    }

    /// Dispatches queued or executing.
    pub fn in_flight_count(&self) -> u64 {
        self.in_flight.load(Ordering::Relaxed)
    }

    pub fn thread_count(&self) -> usize {
        self.workers.len()
    }

    /// Stop accepting work, let workers finish queued dispatches and join them.
    pub fn shutdown(&mut self) {
        let Some(sender) = self.job_sender.take() else {
            return;
        };
        drop(sender);
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!("cpu generation worker panicked");
            }
        }
        debug!("cpu generation backend stopped");
    }

    fn submit(&self, stage: Stage, dispatch: Dispatch) -> Result<(), DispatchError> {
        let Some(sender) = &self.job_sender else {
            return Err(dispatch.reject(stage, BackendError::Disconnected));
        };
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        sender.try_send(Job { stage, dispatch }).map_err(|error| {
            self.in_flight.fetch_sub(1, Ordering::Relaxed);
            let (job, cause) = match error {
                TrySendError::Full(job) => (job, BackendError::Busy),
                TrySendError::Disconnected(job) => (job, BackendError::Disconnected),
            };
            job.dispatch.reject(job.stage, cause)
        })
    }
}

impl ComputeBackend for CpuBackend {
    fn execute_density(&self, dispatch: Dispatch) -> Result<(), DispatchError> {
        self.submit(Stage::Density, dispatch)
    }

    fn read_back_heights(&self, dispatch: Dispatch) -> Result<(), DispatchError> {
        self.submit(Stage::HeightReadback, dispatch)
    }

    fn contour(&self, dispatch: Dispatch) -> Result<(), DispatchError> {
        self.submit(Stage::Contour, dispatch)
    }
}

impl Drop for CpuBackend {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Worker count used when the configuration leaves it at zero.
pub fn default_thread_count() -> usize {
    let cpus = num_cpus::get().max(2);
    (cpus - 2).max(1)
}

fn worker_loop(
    receiver: &Receiver<Job>,
    terrain: &Terrain,
    store: &VoxelStore,
    in_flight: &AtomicU64,
) {
    while let Ok(Job { stage, mut dispatch }) = receiver.recv() {
        match stage {
            Stage::Density => density::fill(terrain, store, dispatch.anchor, &mut dispatch.buffer),
            // The height map already lives in host memory.
            Stage::HeightReadback => {}
            Stage::Contour => contour::build(&mut dispatch.buffer),
        }
        trace!(anchor = ?dispatch.anchor, %stage, ticket = dispatch.ticket.0, "stage finished");
        in_flight.fetch_sub(1, Ordering::Relaxed);
        if !dispatch.complete(stage, Ok(())) {
            trace!("completion receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crossbeam_channel::unbounded;
    use glam::IVec3;
    use terra_voxel::ChunkAddressing;

    use super::*;
    use crate::backend::{StageCompletion, Ticket};
    use crate::{BufferLayout, BufferPool};

    fn backend(threads: usize) -> (CpuBackend, BufferPool, WorldConfig) {
        let world = WorldConfig::default();
        let store = VoxelStore::new(ChunkAddressing::from_world(&world));
        let backend = CpuBackend::new(&world, store, threads).unwrap();
        let pool = BufferPool::new(BufferLayout::from_world(&world));
        (backend, pool, world)
    }

    fn recv(receiver: &Receiver<StageCompletion>) -> StageCompletion {
        receiver.recv_timeout(Duration::from_secs(10)).unwrap()
    }

    #[test]
    fn test_three_stages_round_trip_buffer() {
        let (backend, pool, world) = backend(2);
        let (reply, completions) = unbounded();
        let layout = BufferLayout::from_world(&world);
        let dispatch = |buffer| Dispatch {
            ticket: Ticket(1),
            anchor: IVec3::new(0, 32, 0),
            groups: layout.thread_groups(),
            buffer,
            reply: reply.clone(),
        };

        backend.execute_density(dispatch(pool.acquire().unwrap())).unwrap();
        let done = recv(&completions);
        assert_eq!(done.stage, Stage::Density);
        assert!(done.buffer.counts.solid > 0);

        backend.read_back_heights(dispatch(done.buffer)).unwrap();
        let done = recv(&completions);
        assert_eq!(done.stage, Stage::HeightReadback);

        backend.contour(dispatch(done.buffer)).unwrap();
        let done = recv(&completions);
        assert_eq!(done.stage, Stage::Contour);
        assert!(done.result.is_ok());
        assert!(done.buffer.counts.indices > 0);
        assert_eq!(backend.in_flight_count(), 0);
    }

    #[test]
    fn test_shutdown_rejects_new_work() {
        let (mut backend, pool, world) = backend(1);
        backend.shutdown();
        let (reply, _completions) = unbounded();
        let error = backend
            .execute_density(Dispatch {
                ticket: Ticket(2),
                anchor: IVec3::ZERO,
                groups: BufferLayout::from_world(&world).thread_groups(),
                buffer: pool.acquire().unwrap(),
                reply,
            })
            .unwrap_err();
        assert_eq!(error.error, BackendError::Disconnected);
        pool.release(error.buffer);
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn test_workers_are_named() {
        let (backend, _, _) = backend(3);
        assert_eq!(backend.thread_count(), 3);
        let names: Vec<_> = backend
            .workers
            .iter()
            .filter_map(|w| w.thread().name().map(str::to_owned))
            .collect();
        assert!(names.contains(&"terra-cpu-backend-2".to_owned()));
        assert!(default_thread_count() >= 1);
    }
}
