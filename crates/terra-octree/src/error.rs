//! Spatial index error types.

use terra_math::Aabb;

/// Errors raised while building, growing or checking an [`Octree`](crate::Octree).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OctreeError {
    /// Chunk size must be a positive power of two.
    #[error("chunk size {0} must be a positive power of two")]
    InvalidChunkSize(i32),

    /// Bounds cannot be partitioned into chunk-sized leaves.
    #[error("bounds {bounds:?} cannot be partitioned into chunk-sized cells")]
    InvalidShape { bounds: Aabb },

    /// The root still misses the requested circle after the allowed expansions.
    #[error("root does not contain the visibility circle after {steps} expansions")]
    ExpansionLimit { steps: u32 },

    /// Growing the root would leave the `i32` coordinate range.
    #[error("root expansion of {bounds:?} overflows world coordinates")]
    ExtentOverflow { bounds: Aabb },

    /// A branch's bounds differ from the union of its children.
    #[error("branch {bounds:?} differs from union of its children {union:?}")]
    BoundsMismatch { bounds: Aabb, union: Aabb },

    /// A leaf is larger than one chunk on some axis.
    #[error("leaf {bounds:?} exceeds the chunk size")]
    OversizedLeaf { bounds: Aabb },
}
