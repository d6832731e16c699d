//! Procedural terrain: fBm surface heights, tree placement and material layering.

use noise::{NoiseFn, Simplex};
use terra_config::WorldConfig;
use terra_voxel::Voxel;

const TREE_SEED_SALT: u64 = 0x9E37_79B9;
const TRUNK_HEIGHT: i32 = 3;
const DIRT_DEPTH: i32 = 3;

/// Tunables for the terrain function.
#[derive(Clone, Debug)]
pub struct TerrainParams {
    pub seed: u64,
    /// Height the noise oscillates around.
    pub base_height: f64,
    /// Amplitude of the first octave.
    pub amplitude: f64,
    pub octaves: u32,
    pub lacunarity: f64,
    pub persistence: f64,
    pub base_frequency: f64,
    /// Tree noise above this plants a tree.
    pub tree_threshold: f64,
    pub tree_frequency: f64,
    pub sea_level: i32,
    pub max_height: i32,
}

impl TerrainParams {
    pub fn from_world(world: &WorldConfig) -> Self {
        let max_height = f64::from(world.max_height);
        Self {
            seed: world.seed,
            base_height: max_height * 0.35,
            amplitude: max_height * 0.3,
            octaves: 5,
            lacunarity: 2.0,
            persistence: 0.5,
            base_frequency: 0.008,
            tree_threshold: 0.55,
            tree_frequency: 0.37,
            sea_level: world.sea_level as i32,
            max_height: world.max_height as i32,
        }
    }
}

/// Deterministic terrain sampler shared by the density workers.
pub struct Terrain {
    surface_noise: Simplex,
    tree_noise: Simplex,
    params: TerrainParams,
}

impl Terrain {
    pub fn new(params: TerrainParams) -> Self {
        Self {
            surface_noise: Simplex::new(params.seed as u32),
            tree_noise: Simplex::new((params.seed ^ TREE_SEED_SALT) as u32),
            params,
        }
    }

    pub fn params(&self) -> &TerrainParams {
        &self.params
    }

    /// Integer surface height of the column at world `(x, z)`, kept inside
    /// `[1, max_height - 1]`.
    pub fn surface_height(&self, x: i32, z: i32) -> i32 {
        let p = &self.params;
        let (x, z) = (f64::from(x), f64::from(z));
        let mut total = 0.0;
        let mut frequency = p.base_frequency;
        let mut amplitude = p.amplitude;
        for _ in 0..p.octaves {
            total += self.surface_noise.get([x * frequency, z * frequency]) * amplitude;
            frequency *= p.lacunarity;
            amplitude *= p.persistence;
        }
        let height = (p.base_height + total).floor() as i32;
        height.clamp(1, (p.max_height - 1).max(1))
    }

    /// Whether a tree grows from the column with the given surface.
    pub fn has_tree(&self, x: i32, z: i32, surface: i32) -> bool {
        let p = &self.params;
        if surface <= p.sea_level + 1 || surface + TRUNK_HEIGHT + 1 > p.max_height {
            return false;
        }
        let f = p.tree_frequency;
        self.tree_noise.get([f64::from(x) * f, f64::from(z) * f]) > p.tree_threshold
    }

    /// Material at world height `y` of a column.
    pub fn voxel_at(&self, y: i32, surface: i32, tree: bool) -> Voxel {
        let p = &self.params;
        if y < 0 || y > p.max_height {
            return Voxel::AIR;
        }
        if y < surface - DIRT_DEPTH {
            return Voxel::STONE;
        }
        if y < surface {
            return Voxel::new(Voxel::DIRT_ID);
        }
        if y == surface {
            return if surface <= p.sea_level + 1 {
                Voxel::new(Voxel::SAND_ID)
            } else {
                Voxel::new(Voxel::GRASS_ID)
            };
        }
        if tree {
            if y <= surface + TRUNK_HEIGHT {
                return Voxel::new(Voxel::WOOD_ID);
            }
            if y == surface + TRUNK_HEIGHT + 1 {
                return Voxel::new(Voxel::LEAVES_ID);
            }
        }
        if y <= p.sea_level {
            Voxel::WATER
        } else {
            Voxel::AIR
        }
    }
}
