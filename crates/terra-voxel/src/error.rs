use glam::IVec3;

/// Errors from voxel addressing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VoxelError {
    /// No chunk column stores this position, neither as core nor as margin.
    #[error("local position {local} of column {anchor} is outside every owning column")]
    OutOfRange { anchor: IVec3, local: IVec3 },
}
