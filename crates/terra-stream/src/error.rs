//! Streaming error types.

use glam::IVec3;
use terra_config::ConfigError;
use terra_generation::{BackendError, PoolError, Stage};
use terra_octree::OctreeError;
use terra_voxel::VoxelError;

/// Failures surfaced by the streaming world to its owner.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// A chunk failed to generate twice in a row.
    #[error("generation of chunk {anchor} failed during {stage}")]
    GenerationFailed {
        anchor: IVec3,
        stage: Stage,
        #[source]
        source: BackendError,
    },

    /// The compute backend reported an unrecoverable failure.
    #[error("compute backend failed during {stage} for chunk {anchor}")]
    Backend {
        anchor: IVec3,
        stage: Stage,
        #[source]
        source: BackendError,
    },

    #[error(transparent)]
    Octree(#[from] OctreeError),

    #[error(transparent)]
    Voxel(#[from] VoxelError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to spawn visibility scanner thread")]
    ScannerSpawn(#[source] std::io::Error),
}
