//! Configuration system for the terrain streaming engine.
//!
//! World, streaming and generation settings persist to disk as RON files.
//! Supports CLI overrides via clap, hot-reload detection, validation, and
//! forward/backward compatible serialization.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{CONFIG_FILE_NAME, Config, DebugConfig, GenerationConfig, StreamingConfig, WorldConfig};
pub use error::ConfigError;

/// Platform default directory for `config.ron`.
///
/// Falls back to the working directory when the platform has no config dir.
pub fn default_config_dir() -> std::path::PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("terra"))
        .unwrap_or_else(|| std::path::PathBuf::from("."))
}
