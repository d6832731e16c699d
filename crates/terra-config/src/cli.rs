//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Flags accepted by the streaming binaries. Any flag given wins over the
/// matching `config.ron` setting.
#[derive(Parser, Debug, Default)]
#[command(name = "terra", about = "Voxel terrain streaming")]
pub struct CliArgs {
    /// Chunk edge length in voxels.
    #[arg(long)]
    pub chunk_size: Option<u32>,

    /// Streaming radius in chunks.
    #[arg(long)]
    pub render_distance: Option<u32>,

    /// Maximum terrain height in voxels.
    #[arg(long)]
    pub max_height: Option<u32>,

    /// Terrain seed.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Number of frames to run before exiting.
    #[arg(long, default_value_t = 600)]
    pub frames: u64,

    /// Tracing filter level, e.g. `debug` or `terra_stream=trace`.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Directory holding `config.ron` instead of the platform config dir.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Upload meshes to a GPU device instead of counting them on the host.
    #[arg(long)]
    pub gpu: bool,
}

impl Config {
    /// Overwrite every setting that has a flag set in `args`.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(size) = args.chunk_size {
            self.world.chunk_size = size;
        }
        if let Some(distance) = args.render_distance {
            self.world.render_distance = distance;
        }
        if let Some(height) = args.max_height {
            self.world.max_height = height;
        }
        if let Some(seed) = args.seed {
            self.world.seed = seed;
        }
        if let Some(level) = &args.log_level {
            self.debug.log_level.clone_from(level);
        }
    }
}
