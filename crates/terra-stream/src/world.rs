//! The world context tying scanner, driver and voxel storage together.

use std::sync::Arc;
use std::time::Duration;

use glam::{IVec3, Vec3};
use rustc_hash::FxHashSet;
use tracing::{debug, info};

use terra_config::{Config, WorldConfig};
use terra_generation::{BufferLayout, BufferPool, ComputeBackend, MeshSink};
use terra_math::{column_anchor, snap_down};
use terra_octree::{CellStats, Octree};
use terra_voxel::{Voxel, VoxelStore};

use crate::driver::StreamingDriver;
use crate::error::StreamError;
use crate::pipeline::GenerationPipeline;
use crate::scanner::{ScanShared, Scanner, VisibilityScanner, scan_queues};
use crate::slot::Residency;
use crate::stats::{StreamStats, TickReport};

/// A running streaming world.
///
/// Built once from a validated [`Config`]; the world configuration is frozen
/// for the lifetime of the value. Owns the scanner thread and the main-thread
/// driver. Dropping the world shuts both down.
pub struct StreamingWorld<S: MeshSink> {
    world: Arc<WorldConfig>,
    store: VoxelStore,
    shared: Arc<ScanShared>,
    scanner: VisibilityScanner,
    driver: StreamingDriver<S>,
    shut_down: bool,
}

impl<S: MeshSink> StreamingWorld<S> {
    /// Build the octree, pre-warm the buffer pool and start the scanner.
    ///
    /// `store` must be the same store the backend reads edits from.
    pub fn start(
        config: &Config,
        store: VoxelStore,
        backend: Box<dyn ComputeBackend>,
        sink: S,
    ) -> Result<Self, StreamError> {
        config.validate()?;
        let world = Arc::new(config.world.clone());
        let chunk_size = world.chunk_size as i32;

        let tree = Octree::new(
            chunk_size,
            world.column_height() as i32,
            (world.initial_extent as i32).saturating_mul(chunk_size),
        )?;
        let shared = Arc::new(ScanShared::new(tree.skeleton()));
        let (queues, receivers) = scan_queues();

        let pool = BufferPool::with_prewarm(
            BufferLayout::from_world(&world),
            config.generation.initial_buffers,
        )?;
        let pipeline = GenerationPipeline::new(backend, pool);
        let driver = StreamingDriver::new(
            tree,
            Arc::clone(&shared),
            receivers,
            pipeline,
            sink,
            config.streaming.clone(),
        );

        let scanner = Scanner::new(Arc::clone(&shared), queues, world.render_distance_units());
        let scanner = VisibilityScanner::spawn(
            scanner,
            Duration::from_millis(config.streaming.scan_interval_ms),
        )
        .map_err(StreamError::ScannerSpawn)?;

        info!(
            chunk_size,
            render_distance = world.render_distance,
            column_height = world.column_height(),
            buffers = config.generation.initial_buffers,
            "streaming world started"
        );
        Ok(Self {
            world,
            store,
            shared,
            scanner,
            driver,
            shut_down: false,
        })
    }

    pub fn world_config(&self) -> &Arc<WorldConfig> {
        &self.world
    }

    pub fn store(&self) -> &VoxelStore {
        &self.store
    }

    pub fn driver(&self) -> &StreamingDriver<S> {
        &self.driver
    }

    pub fn sink(&self) -> &S {
        self.driver.sink()
    }

    pub fn stats(&self) -> StreamStats {
        self.driver.stats()
    }

    /// Move the viewpoint. The scanner is woken when the cell changes.
    pub fn set_viewpoint(&mut self, position: Vec3) {
        let cell = column_anchor(position.floor().as_ivec3(), self.world.chunk_size as i32);
        if self.shared.viewpoint_cell() != Some(cell) {
            self.shared.set_viewpoint_cell(cell);
            self.scanner.wake();
        }
    }

    pub fn viewpoint_cell(&self) -> Option<IVec3> {
        self.shared.viewpoint_cell()
    }

    /// Anchors the scanner currently wants resident.
    pub fn desired_anchors(&self) -> FxHashSet<IVec3> {
        self.shared.resident_snapshot()
    }

    pub fn residency(&self, anchor: IVec3) -> Residency {
        self.driver.residency(anchor)
    }

    /// Run one frame of streaming work.
    pub fn tick(&mut self) -> Result<TickReport, StreamError> {
        let report = self.driver.tick()?;
        if report.expansions > 0 {
            self.scanner.wake();
        }
        Ok(report)
    }

    /// Edited voxel stored for `anchor + local`, if any.
    pub fn get_voxel(&self, anchor: IVec3, local: IVec3) -> Option<Voxel> {
        self.store.get_voxel(anchor, local)
    }

    pub fn get_world_voxel(&self, world: IVec3) -> Option<Voxel> {
        self.store.get_world_voxel(world)
    }

    /// Store an edit in every owning column and queue every resident leaf
    /// that reads the voxel for regeneration.
    pub fn set_voxel(&mut self, anchor: IVec3, local: IVec3, voxel: Voxel) -> Result<(), StreamError> {
        let owners = self.store.set_voxel(anchor, local, voxel)?;
        let heights = leaf_floors(
            local.y,
            self.world.chunk_size as i32,
            self.world.margin as i32,
            self.world.column_height() as i32,
        );
        for column in owners.anchors() {
            for floor in heights.iter().flatten() {
                self.driver
                    .request_regeneration(IVec3::new(column.x, *floor, column.z));
            }
        }
        debug!(?anchor, ?local, id = voxel.id, "voxel edited");
        Ok(())
    }

    pub fn set_world_voxel(&mut self, world: IVec3, voxel: Voxel) -> Result<(), StreamError> {
        let (anchor, local) = self.store.addressing().split(world);
        self.set_voxel(anchor, local, voxel)
    }

    /// Recompute the octree's cached statistics.
    pub fn refresh_aggregates(&mut self) -> CellStats {
        self.driver.refresh_aggregates()
    }

    /// Stop the scanner, drain in-flight generations, unrender every mesh and
    /// dispose the buffer pool.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.scanner.shutdown();
        self.driver.shutdown();
        info!("streaming world shut down");
    }
}

impl<S: MeshSink> Drop for StreamingWorld<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Minimum y of the leaves whose buffers contain height `y`: the leaf whose
/// core holds it and, inside the bottom margin rows, the leaf below.
fn leaf_floors(y: i32, chunk_size: i32, margin: i32, column_height: i32) -> [Option<i32>; 2] {
    let floor = snap_down(y, chunk_size);
    let own = (0..column_height).contains(&floor).then_some(floor);
    let below = floor - chunk_size;
    let lower = (y - floor < margin && below >= 0 && below < column_height).then_some(below);
    [own, lower]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leaf_floors_core_voxel() {
        assert_eq!(leaf_floors(37, 16, 2, 128), [Some(32), None]);
    }

    #[test]
    fn test_leaf_floors_margin_rows_reach_leaf_below() {
        assert_eq!(leaf_floors(33, 16, 2, 128), [Some(32), Some(16)]);
        assert_eq!(leaf_floors(32, 16, 2, 128), [Some(32), Some(16)]);
        assert_eq!(leaf_floors(34, 16, 2, 128), [Some(32), None]);
    }

    #[test]
    fn test_leaf_floors_at_world_limits() {
        assert_eq!(leaf_floors(0, 16, 2, 128), [Some(0), None]);
        // Top of the world belongs only to the highest leaf's margin.
        assert_eq!(leaf_floors(128, 16, 2, 128), [None, Some(112)]);
    }
}
