//! End-to-end streaming against the CPU generation backend.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use glam::{IVec3, Vec3};
use rustc_hash::FxHashSet;

use terra_config::{Config, StreamingConfig, WorldConfig};
use terra_generation::cpu::{Terrain, TerrainParams};
use terra_generation::{
    ComputeBackend, CpuBackend, Dispatch, DispatchError, HostMeshSink, MeshHandle,
};
use terra_stream::{Residency, StreamingWorld};
use terra_voxel::{ChunkAddressing, Voxel, VoxelStore};

const SETTLE_TIMEOUT: Duration = Duration::from_secs(20);

fn config() -> Config {
    Config {
        world: WorldConfig {
            chunk_size: 16,
            margin: 2,
            // Column height rounds up to 64, so the top leaf is always sky.
            max_height: 33,
            render_distance: 2,
            initial_extent: 0,
            seed: 7,
            sea_level: 12,
            ..WorldConfig::default()
        },
        streaming: StreamingConfig {
            scan_interval_ms: 5,
            max_materializations_per_frame: 32,
            max_evictions_per_frame: 32,
            max_generation_starts_per_frame: 16,
            max_completions_per_frame: 64,
            ..StreamingConfig::default()
        },
        ..Config::default()
    }
}

/// Forwards to a [`CpuBackend`], recording contours and optionally holding
/// density dispatches until [`GatedBackend::open`].
#[derive(Clone)]
struct GatedBackend {
    inner: Arc<CpuBackend>,
    contoured: Arc<Mutex<Vec<IVec3>>>,
    held: Arc<Mutex<Option<Vec<Dispatch>>>>,
}

impl GatedBackend {
    fn new(world: &WorldConfig, store: VoxelStore, gated: bool) -> Self {
        Self {
            inner: Arc::new(CpuBackend::new(world, store, 2).unwrap()),
            contoured: Arc::default(),
            held: Arc::new(Mutex::new(gated.then(Vec::new))),
        }
    }

    fn open(&self) {
        let held = self.held.lock().unwrap().take();
        for dispatch in held.into_iter().flatten() {
            self.inner.execute_density(dispatch).unwrap();
        }
    }

    fn contoured(&self) -> Vec<IVec3> {
        self.contoured.lock().unwrap().clone()
    }
}

impl ComputeBackend for GatedBackend {
    fn execute_density(&self, dispatch: Dispatch) -> Result<(), DispatchError> {
        if let Some(held) = self.held.lock().unwrap().as_mut() {
            held.push(dispatch);
            return Ok(());
        }
        self.inner.execute_density(dispatch)
    }

    fn read_back_heights(&self, dispatch: Dispatch) -> Result<(), DispatchError> {
        self.inner.read_back_heights(dispatch)
    }

    fn contour(&self, dispatch: Dispatch) -> Result<(), DispatchError> {
        self.contoured.lock().unwrap().push(dispatch.anchor);
        self.inner.contour(dispatch)
    }
}

struct Harness {
    world: StreamingWorld<HostMeshSink>,
    backend: GatedBackend,
    terrain: Terrain,
    dim: i32,
}

impl Harness {
    fn start(gated: bool) -> Self {
        let config = config();
        let store = VoxelStore::new(ChunkAddressing::from_world(&config.world));
        let backend = GatedBackend::new(&config.world, store.clone(), gated);
        let world =
            StreamingWorld::start(&config, store, Box::new(backend.clone()), HostMeshSink::new())
                .unwrap();
        Self {
            world,
            backend,
            terrain: Terrain::new(TerrainParams::from_world(&config.world)),
            dim: config.world.chunk_size_with_margin() as i32,
        }
    }

    /// Leaves within render distance of the viewpoint, by exhaustive walk.
    fn in_range(&self) -> FxHashSet<IVec3> {
        let Some(cell) = self.world.viewpoint_cell() else {
            return FxHashSet::default();
        };
        let center = cell.as_dvec3();
        let radius = self.world.world_config().render_distance_units();
        let mut anchors = FxHashSet::default();
        self.world.driver().tree().for_each_leaf(|leaf| {
            if leaf.bounds().horizontal_distance_squared(center) < radius * radius {
                anchors.insert(leaf.anchor());
            }
        });
        anchors
    }

    /// Whether terrain alone leaves every voxel of the leaf's buffer empty.
    fn is_sky(&self, anchor: IVec3) -> bool {
        for z in anchor.z..anchor.z + self.dim {
            for x in anchor.x..anchor.x + self.dim {
                let surface = self.terrain.surface_height(x, z);
                let tree = self.terrain.has_tree(x, z, surface);
                if (anchor.y..anchor.y + self.dim)
                    .any(|y| !self.terrain.voxel_at(y, surface, tree).is_air())
                {
                    return false;
                }
            }
        }
        true
    }

    fn is_settled(&self) -> bool {
        let desired = self.world.desired_anchors();
        let driver = self.world.driver();
        !desired.is_empty()
            && driver.in_flight() == 0
            && driver.pending_generations() == 0
            && driver.deferred_evictions() == 0
            && desired == self.in_range()
            && driver.allocated_anchors().is_subset(&desired)
            && desired.iter().all(|anchor| {
                let expected = if self.is_sky(*anchor) {
                    Residency::Unallocated
                } else {
                    Residency::Idle
                };
                self.world.residency(*anchor) == expected
            })
    }

    fn run_until(&mut self, what: &str, mut done: impl FnMut(&Self) -> bool) {
        let deadline = Instant::now() + SETTLE_TIMEOUT;
        loop {
            self.world.tick().unwrap();
            if done(self) {
                return;
            }
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            thread::sleep(Duration::from_millis(1));
        }
    }

    fn settle(&mut self) {
        self.run_until("streaming to settle", Self::is_settled);
    }

    fn mesh_of(&self, anchor: IVec3) -> Option<MeshHandle> {
        self.world.driver().slot(anchor).and_then(|slot| slot.mesh())
    }
}

#[test]
fn test_streams_every_leaf_in_range() {
    let mut h = Harness::start(false);
    h.world.set_viewpoint(Vec3::new(0.5, 10.0, 0.5));
    h.settle();

    let desired = h.world.desired_anchors();
    // 4x4 columns of four leaves each.
    assert_eq!(desired.len(), 64);
    assert_eq!(h.world.viewpoint_cell(), Some(IVec3::ZERO));

    let stats = h.world.stats();
    assert_eq!(stats.materializations, 64);
    assert_eq!(stats.uploads + stats.empty_chunks, 64);
    assert_eq!(stats.root_expansions, 0);
    for anchor in desired.iter().filter(|a| a.y == 48) {
        assert_eq!(h.world.residency(*anchor), Residency::Unallocated);
    }
    for anchor in desired.iter().filter(|a| a.y == 0) {
        assert!(h.mesh_of(*anchor).is_some());
    }

    let contoured = h.backend.contoured();
    assert_eq!(contoured.len() as u64, stats.uploads);
    assert!(contoured.iter().all(|anchor| !h.is_sky(*anchor)));
    assert_eq!(h.world.sink().live() as u64, stats.uploads);

    let pool = h.world.driver().pool();
    assert_eq!(pool.in_use(), 0);
    assert_eq!(pool.available(), pool.allocated());
}

#[test]
fn test_one_chunk_step_changes_only_the_edges() {
    let mut h = Harness::start(false);
    h.world.set_viewpoint(Vec3::new(0.5, 10.0, 0.5));
    h.settle();
    let before = h.world.desired_anchors();
    let allocated_before = h.world.driver().allocated_anchors();
    let handles: Vec<_> = allocated_before
        .iter()
        .map(|anchor| (*anchor, h.mesh_of(*anchor)))
        .collect();
    let stats_before = h.world.stats();

    // The circle now crosses the +x side of the root.
    h.world.set_viewpoint(Vec3::new(16.5, 10.0, 0.5));
    h.settle();
    let after = h.world.desired_anchors();
    let stats = h.world.stats();
    assert!(stats.root_expansions >= 1);

    let left: FxHashSet<_> = before.difference(&after).copied().collect();
    let entered: FxHashSet<_> = after.difference(&before).copied().collect();
    assert!(!left.is_empty());
    assert!(!entered.is_empty());
    assert_eq!(
        stats.materializations - stats_before.materializations,
        entered.len() as u64
    );
    assert_eq!(
        stats.evictions - stats_before.evictions,
        left.intersection(&allocated_before).count() as u64
    );
    for anchor in &left {
        assert_eq!(h.world.residency(*anchor), Residency::Unallocated);
        assert_eq!(h.world.sink().meshes_at(*anchor), 0);
    }
    // Leaves that stayed in range keep their geometry.
    for (anchor, handle) in handles {
        if after.contains(&anchor) {
            assert_eq!(h.mesh_of(anchor), handle);
        }
    }
}

#[test]
fn test_eviction_waits_for_inflight_generation() {
    let mut h = Harness::start(true);
    h.world.set_viewpoint(Vec3::new(0.5, 10.0, 0.5));
    h.run_until("every density to be held", |h| {
        let desired = h.world.desired_anchors();
        !desired.is_empty() && h.world.driver().in_flight() == desired.len()
    });
    let before = h.world.desired_anchors();

    h.world.set_viewpoint(Vec3::new(16.5, 10.0, 0.5));
    h.run_until("the rescan after expansion", |h| {
        let desired = h.world.desired_anchors();
        desired != before && desired == h.in_range()
    });
    let left: FxHashSet<_> = before
        .difference(&h.world.desired_anchors())
        .copied()
        .collect();
    assert!(!left.is_empty());
    h.run_until("evictions to be deferred", |h| {
        h.world.driver().deferred_evictions() == left.len()
    });
    for anchor in &left {
        let slot = h.world.driver().slot(*anchor).unwrap();
        assert!(slot.is_generating());
    }
    assert_eq!(h.world.stats().evictions, 0);

    h.backend.open();
    h.settle();
    for anchor in &left {
        assert_eq!(h.world.residency(*anchor), Residency::Unallocated);
        assert_eq!(h.world.sink().meshes_at(*anchor), 0);
    }
    assert_eq!(h.world.stats().evictions, left.len() as u64);
    assert!(h.backend.contoured().iter().all(|anchor| !left.contains(anchor)));
    assert_eq!(h.world.driver().pool().in_use(), 0);
}

#[test]
fn test_edit_regenerates_owning_leaves() {
    let mut h = Harness::start(false);
    h.world.set_viewpoint(Vec3::new(0.5, 10.0, 0.5));
    h.settle();
    let old = h.mesh_of(IVec3::ZERO).unwrap();

    h.world.set_world_voxel(IVec3::new(3, 5, 3), Voxel::AIR).unwrap();
    assert_eq!(h.world.get_world_voxel(IVec3::new(3, 5, 3)), Some(Voxel::AIR));
    h.run_until("the edited leaf to remesh", |h| {
        h.world.stats().regenerations == 1
            && h.is_settled()
            && h.mesh_of(IVec3::ZERO).is_some_and(|mesh| mesh != old)
    });
    assert!(h.world.sink().mesh(old).is_none());
    assert_eq!(h.world.sink().meshes_at(IVec3::ZERO), 1);

    // x = 16 is core of the next column and margin of this one.
    let neighbor = IVec3::new(16, 0, 0);
    let before = (h.mesh_of(IVec3::ZERO), h.mesh_of(neighbor));
    h.world.set_world_voxel(IVec3::new(16, 5, 3), Voxel::AIR).unwrap();
    h.run_until("both owners to remesh", |h| {
        h.world.stats().regenerations == 3 && h.is_settled()
    });
    assert_ne!(h.mesh_of(IVec3::ZERO), before.0);
    assert_ne!(h.mesh_of(neighbor), before.1);
}

#[test]
fn test_shutdown_unrenders_and_disposes() {
    let mut h = Harness::start(false);
    h.world.set_viewpoint(Vec3::new(0.5, 10.0, 0.5));
    h.settle();
    assert!(h.world.sink().live() > 0);

    h.world.shutdown();
    assert_eq!(h.world.sink().live(), 0);
    assert!(h.world.driver().allocated_anchors().is_empty());
    assert!(h.world.driver().pool().acquire().is_err());
    // Idempotent.
    h.world.shutdown();
}
