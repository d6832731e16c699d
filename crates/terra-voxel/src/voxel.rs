//! The voxel value type.

/// One voxel: a material id plus the simulation value used by active
/// (flowing) materials.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Voxel {
    pub id: u16,
    pub active_value: u8,
}

impl Voxel {
    pub const AIR_ID: u16 = 0;
    pub const STONE_ID: u16 = 1;
    pub const DIRT_ID: u16 = 2;
    pub const GRASS_ID: u16 = 3;
    pub const SAND_ID: u16 = 4;
    pub const WOOD_ID: u16 = 5;
    pub const LEAVES_ID: u16 = 6;
    pub const WATER_ID: u16 = 240;

    /// Active values above this mark a voxel as simulated.
    pub const ACTIVE_THRESHOLD: u8 = 15;

    pub const AIR: Voxel = Voxel::new(Self::AIR_ID);
    pub const STONE: Voxel = Voxel::new(Self::STONE_ID);
    pub const WATER: Voxel = Voxel::new(Self::WATER_ID);

    pub const fn new(id: u16) -> Self {
        Self {
            id,
            active_value: 0,
        }
    }

    pub const fn with_active_value(id: u16, active_value: u8) -> Self {
        Self { id, active_value }
    }

    pub fn is_air(&self) -> bool {
        self.id == Self::AIR_ID
    }

    pub fn is_water(&self) -> bool {
        self.id == Self::WATER_ID
    }

    /// Opaque material: neither air nor water.
    pub fn is_opaque(&self) -> bool {
        !self.is_air() && !self.is_water()
    }

    /// Water with enough pressure to flow. These live in the active store.
    pub fn is_active(&self) -> bool {
        self.is_water() && self.active_value > Self::ACTIVE_THRESHOLD
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_air() {
        assert!(Voxel::default().is_air());
        assert!(!Voxel::default().is_opaque());
    }

    #[test]
    fn test_active_requires_water_above_threshold() {
        assert!(!Voxel::with_active_value(Voxel::WATER_ID, 15).is_active());
        assert!(Voxel::with_active_value(Voxel::WATER_ID, 16).is_active());
        assert!(!Voxel::with_active_value(Voxel::STONE_ID, 200).is_active());
    }

    #[test]
    fn test_water_is_not_opaque() {
        assert!(Voxel::WATER.is_water());
        assert!(!Voxel::WATER.is_opaque());
        assert!(Voxel::STONE.is_opaque());
    }
}
