//! Voxel values, chunk-column addressing and the persisted edit stores.
//!
//! Every chunk column stores its own copy of the margin strip shared with
//! its `-x`/`-z` neighbours, so edits near a border are mirrored into each
//! owning column and any chunk can be regenerated from its own storage.

mod addressing;
mod error;
mod store;
mod voxel;

pub use addressing::{ChunkAddressing, Owners};
pub use error::VoxelError;
pub use store::VoxelStore;
pub use voxel::Voxel;
