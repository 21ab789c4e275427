/// `load_config` module: reads the YAML config file into the core [`Config`].
///
/// This is the only place where user-supplied YAML is parsed. Every section
/// of [`Config`] is defaulted, so a file only needs the keys it overrides and
/// an empty file yields the defaults.
///
/// ```yaml
/// intake:
///   decode_timeout_ms: 5000
/// render:
///   load_system_fonts: true
///   resources_dir: ./assets
///   font_family: "DejaVu Sans"
///   max_pixels: 268435456
/// output:
///   dir: ./converted
///   archive: false
/// ```
///
/// # Errors
/// Failures are `anyhow::Error`s naming the file, surfaced at the CLI boundary.
use anyhow::Result;
use std::fs;
use std::path::Path;
use svgpng_batch::Config;
use tracing::{error, info};

/// Environment variable consulted when `--config` is not given.
pub const CONFIG_ENV: &str = "SVGPNG_BATCH_CONFIG";

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    if config_content.trim().is_empty() {
        info!(config_path = ?path_ref, "Config file is empty, using defaults");
        return Ok(Config::default());
    }

    let config: Config = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    config.trace_loaded();
    Ok(config)
}

/// Resolve the config for a run: an explicit path wins, then
/// [`CONFIG_ENV`], then the built-in defaults.
pub fn resolve_config(explicit: Option<&Path>) -> Result<Config> {
    if let Some(path) = explicit {
        return load_config(path);
    }
    match std::env::var_os(CONFIG_ENV) {
        Some(path) if !path.is_empty() => {
            info!(env = CONFIG_ENV, "Using config path from environment");
            load_config(path)
        }
        _ => {
            info!("No config given, using defaults");
            Ok(Config::default())
        }
    }
}
