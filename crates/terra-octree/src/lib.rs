//! Spatial index partitioning the world into chunk-sized leaf cells.
//!
//! The vertical extent of the tree is fixed (the column height); it grows
//! without bound horizontally by replacing the root with a larger one and
//! grafting the old root into the matching child slot. Leaves carry an
//! optional payload (`Octree<ChunkSlot>` on the main thread) and a node is
//! either a leaf or owns exactly eight children, so malformed topology
//! cannot be built.
//!
//! ```
//! use glam::{DVec3, IVec3};
//! use terra_octree::Octree;
//!
//! let mut tree: Octree<u32> = Octree::new(16, 64, 0).unwrap();
//! tree.expand_to_contain(DVec3::ZERO, 100.0, 8).unwrap();
//! let near = tree.leaves_within_distance(DVec3::ZERO, 16.0);
//! assert!(!near.is_empty());
//! assert!(tree.find_leaf(IVec3::new(3, 3, 3)).is_some());
//! ```

mod aggregate;
mod error;
mod node;
mod tree;

pub use aggregate::{CellStats, Summarize};
pub use error::OctreeError;
pub use node::{NodeKind, OctreeNode};
pub use tree::{BoundaryViolation, Octree};
