//! Settings for world shape, streaming budgets and generation, persisted as RON.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Everything a streaming world is started from.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// World shape and terrain settings. Immutable once a world starts.
    pub world: WorldConfig,
    /// Visibility scanning and per-frame budgets.
    pub streaming: StreamingConfig,
    /// Generation buffer and worker settings.
    pub generation: GenerationConfig,
    /// Logging knobs.
    pub debug: DebugConfig,
}

/// World shape and terrain configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorldConfig {
    /// Edge length of one chunk in voxels. Must be a power of two.
    pub chunk_size: u32,
    /// Duplicated border voxels on the positive x/z side of every chunk.
    pub margin: u32,
    /// Highest voxel row that terrain may occupy.
    pub max_height: u32,
    /// Render distance in chunks.
    pub render_distance: u32,
    /// Interval of the world tick in milliseconds.
    pub tick_ms: u64,
    /// Requested initial root extent in chunks (0 = one column-height cube).
    pub initial_extent: u32,
    /// Terrain seed.
    pub seed: u64,
    /// Water fills air below this height.
    pub sea_level: u32,
}

/// Visibility scanner cadence and per-frame driver budgets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StreamingConfig {
    /// Polling interval of the visibility scanner in milliseconds.
    pub scan_interval_ms: u64,
    /// Materialize requests handled per frame.
    pub max_materializations_per_frame: usize,
    /// Evict requests handled per frame.
    pub max_evictions_per_frame: usize,
    /// Generation pipelines started per frame.
    pub max_generation_starts_per_frame: usize,
    /// Stage completions handled per frame.
    pub max_completions_per_frame: usize,
    /// Edited chunks restarted per frame.
    pub max_regenerations_per_frame: usize,
    /// Upper bound on successive root expansions for one viewpoint.
    pub max_root_expansions: u32,
}

/// Generation buffer pool and backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    /// Buffers allocated when the world starts.
    pub initial_buffers: usize,
    /// CPU backend worker threads (0 = derive from core count).
    pub worker_threads: usize,
}

/// Diagnostics output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Tracing filter used when `RUST_LOG` is unset.
    pub log_level: String,
    /// Log streaming statistics every N frames (0 = never).
    pub log_stats_every_frames: u64,
}

// --- Defaults ---

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            chunk_size: 16,
            margin: 2,
            max_height: 128,
            render_distance: 8,
            tick_ms: 300,
            initial_extent: 0,
            seed: 0,
            sea_level: 42,
        }
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            scan_interval_ms: 500,
            max_materializations_per_frame: 4,
            max_evictions_per_frame: 8,
            max_generation_starts_per_frame: 2,
            max_completions_per_frame: 8,
            max_regenerations_per_frame: 4,
            max_root_expansions: 24,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            initial_buffers: 18,
            worker_threads: 0,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_stats_every_frames: 120,
        }
    }
}

// --- Derived world values ---

impl WorldConfig {
    /// Chunk edge length including the margin strip.
    pub fn chunk_size_with_margin(&self) -> u32 {
        self.chunk_size + self.margin
    }

    /// Vertical extent of the world: the smallest `chunk_size * 2^k`
    /// that reaches `max_height`.
    pub fn column_height(&self) -> u32 {
        let mut height = self.chunk_size.max(1);
        while height < self.max_height {
            height *= 2;
        }
        height
    }

    /// Render distance converted to world units.
    pub fn render_distance_units(&self) -> f64 {
        f64::from(self.render_distance) * f64::from(self.chunk_size)
    }
}

// --- Validation ---

impl Config {
    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let world = &self.world;
        if world.chunk_size < 2 || !world.chunk_size.is_power_of_two() {
            return Err(invalid("world.chunk_size", "must be a power of two >= 2"));
        }
        if world.margin == 0 || world.margin >= world.chunk_size {
            return Err(invalid("world.margin", "must be in 1..chunk_size"));
        }
        if world.max_height < world.chunk_size {
            return Err(invalid("world.max_height", "must be at least chunk_size"));
        }
        if world.render_distance == 0 {
            return Err(invalid("world.render_distance", "must be at least 1"));
        }

        let streaming = &self.streaming;
        let budgets = [
            (
                "streaming.max_materializations_per_frame",
                streaming.max_materializations_per_frame,
            ),
            (
                "streaming.max_evictions_per_frame",
                streaming.max_evictions_per_frame,
            ),
            (
                "streaming.max_generation_starts_per_frame",
                streaming.max_generation_starts_per_frame,
            ),
            (
                "streaming.max_completions_per_frame",
                streaming.max_completions_per_frame,
            ),
            (
                "streaming.max_regenerations_per_frame",
                streaming.max_regenerations_per_frame,
            ),
        ];
        for (field, value) in budgets {
            if value == 0 {
                return Err(invalid(field, "per-frame budget must be at least 1"));
            }
        }
        if streaming.scan_interval_ms == 0 {
            return Err(invalid("streaming.scan_interval_ms", "must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

// --- Load / Save / Reload ---

/// File name of the persisted configuration inside a config directory.
pub const CONFIG_FILE_NAME: &str = "config.ron";

fn read_config(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    ron::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

impl Config {
    /// Read `config.ron` from `config_dir`, writing the defaults there first
    /// when the file does not exist yet.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let path = config_dir.join(CONFIG_FILE_NAME);
        if !path.exists() {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("wrote default config to {}", path.display());
            return Ok(config);
        }
        let config = read_config(&path)?;
        log::info!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        let path = config_dir.join(CONFIG_FILE_NAME);
        let write_err = |source| ConfigError::Write {
            path: path.clone(),
            source,
        };
        std::fs::create_dir_all(config_dir).map_err(write_err)?;

        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);
        let encoded = ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::Encode)?;
        std::fs::write(&path, encoded).map_err(write_err)
    }

    /// Re-read the file; `Some` only when it differs from `self`.
    ///
    /// A running world keeps its frozen world settings; callers decide which
    /// sections they can apply live.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let fresh = read_config(&config_dir.join(CONFIG_FILE_NAME))?;
        if &fresh == self {
            return Ok(None);
        }
        log::info!("config changed on disk");
        Ok(Some(fresh))
    }
}
