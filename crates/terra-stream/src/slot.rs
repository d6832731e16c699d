//! Per-leaf chunk state.

use glam::IVec3;
use terra_generation::{ChunkSummary, MeshHandle, Ticket};
use terra_octree::{CellStats, OctreeNode, Summarize};

/// Whether a leaf's chunk has current geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Residency {
    /// No slot on the leaf.
    Unallocated,
    /// Geometry is missing or stale and a generation must run.
    WaitingToMesh,
    /// Geometry matches the stored voxels (or the chunk is known empty).
    Idle,
}

/// Whether a generation attempt is in flight for the chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenerationState {
    Idle,
    Generating(Ticket),
}

/// One resident chunk, owned by the octree leaf it annotates.
#[derive(Debug, Clone)]
pub struct ChunkSlot {
    anchor: IVec3,
    pub(crate) residency: Residency,
    pub(crate) generation: GenerationState,
    pub(crate) mesh: Option<MeshHandle>,
    pub(crate) summary: Option<ChunkSummary>,
    /// Consecutive retryable failures.
    pub(crate) failures: u8,
}

impl ChunkSlot {
    pub(crate) fn new(anchor: IVec3) -> Self {
        Self {
            anchor,
            residency: Residency::WaitingToMesh,
            generation: GenerationState::Idle,
            mesh: None,
            summary: None,
            failures: 0,
        }
    }

    pub fn anchor(&self) -> IVec3 {
        self.anchor
    }

    pub fn residency(&self) -> Residency {
        self.residency
    }

    pub fn generation(&self) -> GenerationState {
        self.generation
    }

    pub fn is_generating(&self) -> bool {
        matches!(self.generation, GenerationState::Generating(_))
    }

    /// Ready for the driver to start a generation.
    pub fn needs_generation(&self) -> bool {
        self.residency == Residency::WaitingToMesh && self.generation == GenerationState::Idle
    }

    pub fn mesh(&self) -> Option<MeshHandle> {
        self.mesh
    }

    pub fn summary(&self) -> Option<&ChunkSummary> {
        self.summary.as_ref()
    }
}

impl Summarize for ChunkSlot {
    fn summarize(&self) -> Option<CellStats> {
        self.summary.map(|s| CellStats {
            contains_water: s.contains_water,
            tree_count: s.tree_count,
            average_height: s.average_height,
            populated: 1,
        })
    }
}

/// Residency of a leaf, `Unallocated` when it carries no slot.
pub fn residency_of(leaf: &OctreeNode<ChunkSlot>) -> Residency {
    leaf.chunk()
        .map_or(Residency::Unallocated, ChunkSlot::residency)
}

#[cfg(test)]
mod tests {
    use terra_math::Aabb;

    use super::*;

    #[test]
    fn test_new_slot_waits_for_mesh() {
        let slot = ChunkSlot::new(IVec3::new(16, 0, 32));
        assert_eq!(slot.residency(), Residency::WaitingToMesh);
        assert!(slot.needs_generation());
        assert!(!slot.is_generating());
        assert!(slot.summarize().is_none());
    }

    #[test]
    fn test_generating_slot_is_not_restarted() {
        let mut slot = ChunkSlot::new(IVec3::ZERO);
        slot.generation = GenerationState::Generating(Ticket(4));
        assert!(!slot.needs_generation());
        assert!(slot.is_generating());
    }

    #[test]
    fn test_empty_leaf_is_unallocated() {
        let mut leaf: OctreeNode<ChunkSlot> =
            OctreeNode::new(Aabb::from_min_size(IVec3::ZERO, IVec3::splat(16)));
        assert_eq!(residency_of(&leaf), Residency::Unallocated);
        if let Some(slot) = leaf.slot_mut() {
            *slot = Some(ChunkSlot::new(IVec3::ZERO));
        }
        assert_eq!(residency_of(&leaf), Residency::WaitingToMesh);
    }

    #[test]
    fn test_summary_feeds_aggregation() {
        let mut slot = ChunkSlot::new(IVec3::ZERO);
        slot.summary = Some(ChunkSummary {
            contains_water: true,
            tree_count: 3,
            average_height: 40.0,
            solid_voxels: 10,
        });
        let stats = slot.summarize().unwrap();
        assert!(stats.contains_water);
        assert_eq!(stats.tree_count, 3);
        assert_eq!(stats.populated, 1);
    }
}
