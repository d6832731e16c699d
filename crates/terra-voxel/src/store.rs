//! Persisted voxel edits, keyed by column anchor then local offset.

use std::ops::Range;
use std::sync::Arc;

use dashmap::DashMap;
use glam::IVec3;
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::addressing::{ChunkAddressing, Owners};
use crate::error::VoxelError;
use crate::voxel::Voxel;

type ColumnEdits = FxHashMap<IVec3, Voxel>;

/// Thread-safe store of edited voxels shared by the world and the
/// generation backend.
///
/// Active voxels (flowing water) live in their own store and shadow the
/// general modified store on reads. Cloning shares the underlying maps.
#[derive(Clone)]
pub struct VoxelStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    addressing: ChunkAddressing,
    active: DashMap<IVec3, ColumnEdits>,
    modified: DashMap<IVec3, ColumnEdits>,
}

impl VoxelStore {
    pub fn new(addressing: ChunkAddressing) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                addressing,
                active: DashMap::new(),
                modified: DashMap::new(),
            }),
        }
    }

    pub fn addressing(&self) -> ChunkAddressing {
        self.inner.addressing
    }

    /// Read an edited voxel. Every owning column is consulted in the active
    /// store first, then in the modified store; the first hit wins.
    pub fn get_voxel(&self, anchor: IVec3, local: IVec3) -> Option<Voxel> {
        let owners = self.inner.addressing.owners(anchor, local);
        lookup(&self.inner.active, &owners).or_else(|| lookup(&self.inner.modified, &owners))
    }

    /// Write a voxel into every column storing it.
    ///
    /// Returns the owning columns so callers can schedule regeneration.
    pub fn set_voxel(
        &self,
        anchor: IVec3,
        local: IVec3,
        voxel: Voxel,
    ) -> Result<Owners, VoxelError> {
        let owners = self.inner.addressing.owners(anchor, local);
        if owners.is_empty() {
            return Err(VoxelError::OutOfRange { anchor, local });
        }

        let (target, other) = if voxel.is_active() {
            (&self.inner.active, &self.inner.modified)
        } else {
            (&self.inner.modified, &self.inner.active)
        };
        for (owner, owner_local) in owners.iter() {
            target.entry(owner).or_default().insert(owner_local, voxel);
            if let Some(mut column) = other.get_mut(&owner) {
                column.remove(&owner_local);
            }
        }
        trace!(?anchor, ?local, id = voxel.id, owners = owners.len(), "voxel written");
        Ok(owners)
    }

    pub fn get_world_voxel(&self, world: IVec3) -> Option<Voxel> {
        let (anchor, local) = self.inner.addressing.split(world);
        self.get_voxel(anchor, local)
    }

    pub fn set_world_voxel(&self, world: IVec3, voxel: Voxel) -> Result<Owners, VoxelError> {
        let (anchor, local) = self.inner.addressing.split(world);
        self.set_voxel(anchor, local, voxel)
    }

    /// Edits stored for one column with local y in `heights`, active voxels
    /// overriding modified ones at the same offset.
    pub fn column_edits(&self, anchor: IVec3, heights: Range<i32>) -> Vec<(IVec3, Voxel)> {
        let mut merged = ColumnEdits::default();
        for store in [&self.inner.modified, &self.inner.active] {
            if let Some(column) = store.get(&anchor) {
                merged.extend(
                    column
                        .iter()
                        .filter(|(local, _)| heights.contains(&local.y))
                        .map(|(local, voxel)| (*local, *voxel)),
                );
            }
        }
        merged.into_iter().collect()
    }

    /// Number of active voxels across all columns (mirrored copies included).
    pub fn active_voxel_count(&self) -> usize {
        self.inner.active.iter().map(|column| column.len()).sum()
    }

    /// Number of columns holding any edit.
    pub fn edited_column_count(&self) -> usize {
        let mut anchors: Vec<IVec3> = self
            .inner
            .modified
            .iter()
            .filter(|column| !column.is_empty())
            .map(|column| *column.key())
            .collect();
        anchors.extend(
            self.inner
                .active
                .iter()
                .filter(|column| !column.is_empty())
                .map(|column| *column.key()),
        );
        anchors.sort_by_key(|a| (a.x, a.z));
        anchors.dedup();
        anchors.len()
    }
}

fn lookup(store: &DashMap<IVec3, ColumnEdits>, owners: &Owners) -> Option<Voxel> {
    owners.iter().find_map(|(anchor, local)| {
        store
            .get(&anchor)
            .and_then(|column| column.get(&local).copied())
    })
}
