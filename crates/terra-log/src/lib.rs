//! Structured logging for the terrain streaming engine.
//!
//! Console output with uptime timestamps and thread names (the scanner and
//! backend workers are named threads), plus JSON file logging in debug
//! builds. `RUST_LOG` wins over the configured log level.

use std::path::Path;

use terra_config::Config;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when neither `RUST_LOG` nor the config names a level.
pub const DEFAULT_FILTER: &str = "info,wgpu=warn,naga=warn";

/// File name of the JSON log written in debug builds.
pub const LOG_FILE_NAME: &str = "terra.log";

/// Initialize the global tracing subscriber.
///
/// * `log_dir` - Optional directory for the JSON log file (debug builds only)
/// * `debug_build` - Whether this is a debug build (enables file logging)
/// * `config` - Optional configuration whose `debug.log_level` sets the filter
///
/// # Examples
///
/// ```no_run
/// use terra_log::init_logging;
/// use terra_config::Config;
///
/// let config = Config::default();
/// init_logging(None, false, Some(&config));
/// ```
pub fn init_logging(log_dir: Option<&Path>, debug_build: bool, config: Option<&Config>) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(config)));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(true)
        .with_level(true)
        .with_timer(fmt::time::uptime());

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    if debug_build
        && let Some(log_dir) = log_dir
        && std::fs::create_dir_all(log_dir).is_ok()
        && let Ok(log_file) = std::fs::File::create(log_dir.join(LOG_FILE_NAME))
    {
        let file_layer = fmt::layer()
            .with_writer(log_file)
            .with_ansi(false)
            .with_target(true)
            .with_thread_names(true)
            .with_timer(fmt::time::uptime())
            .json();

        subscriber.with(file_layer).init();
        tracing::debug!(file = %log_dir.join(LOG_FILE_NAME).display(), "logging initialized");
        return;
    }

    subscriber.init();
    tracing::debug!("logging initialized");
}

/// Filter directive derived from the config, falling back to [`DEFAULT_FILTER`].
pub fn filter_directive(config: Option<&Config>) -> String {
    match config {
        Some(config) if !config.debug.log_level.trim().is_empty() => {
            format!("{},wgpu=warn,naga=warn", config.debug.log_level.trim())
        }
        _ => DEFAULT_FILTER.to_string(),
    }
}

/// Create an `EnvFilter` with the default filter string.
pub fn default_env_filter() -> EnvFilter {
    EnvFilter::new(DEFAULT_FILTER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_quiets_gpu_crates() {
        let rendered = default_env_filter().to_string();
        for directive in ["wgpu=warn", "naga=warn", "info"] {
            assert!(rendered.contains(directive), "{rendered} lacks {directive}");
        }
    }

    #[test]
    fn test_filter_directive_without_config() {
        assert_eq!(filter_directive(None), DEFAULT_FILTER);
    }

    #[test]
    fn test_filter_directive_uses_config_level() {
        let mut config = Config::default();
        config.debug.log_level = "terra_stream=trace".to_string();
        let directive = filter_directive(Some(&config));
        assert!(directive.starts_with("terra_stream=trace"));
        assert!(EnvFilter::try_new(&directive).is_ok());
    }

    #[test]
    fn test_blank_config_level_falls_back() {
        let mut config = Config::default();
        config.debug.log_level = "  ".to_string();
        assert_eq!(filter_directive(Some(&config)), DEFAULT_FILTER);
    }

    #[test]
    fn test_per_crate_levels_parse() {
        let mut config = Config::default();
        for level in [
            "debug,terra_stream=trace",
            "warn,terra_generation=debug,terra_octree=trace",
            "error",
        ] {
            config.debug.log_level = level.to_string();
            let directive = filter_directive(Some(&config));
            assert!(EnvFilter::try_new(&directive).is_ok(), "rejected {directive}");
        }
    }
}
