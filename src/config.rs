use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

/// Runtime configuration for a conversion session. Every section and field
/// has a default, so an empty YAML document is a valid config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub intake: IntakeConfig,
    pub render: RenderConfig,
    pub output: OutputConfig,
}

impl Config {
    pub fn trace_loaded(&self) {
        info!(
            decode_timeout_ms = self.intake.decode_timeout_ms,
            load_system_fonts = self.render.load_system_fonts,
            max_pixels = self.render.max_pixels,
            output_dir = %self.output.dir.display(),
            archive = self.output.archive,
            "Loaded Config"
        );
        debug!(?self, "Config loaded (full debug)");
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntakeConfig {
    /// Upper bound for decoding one file's dimensions.
    pub decode_timeout_ms: u64,
}

impl IntakeConfig {
    pub fn decode_timeout(&self) -> Duration {
        Duration::from_millis(self.decode_timeout_ms)
    }
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            decode_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Load the host's fonts so SVG text can be shaped.
    pub load_system_fonts: bool,
    /// Base directory for relative `href`s inside SVG sources.
    pub resources_dir: Option<PathBuf>,
    /// Family used when an SVG names none.
    pub font_family: Option<String>,
    /// Largest render surface, in pixels, an SVG may be rasterized onto.
    pub max_pixels: u64,
}

impl RenderConfig {
    /// 16384 × 16384, the common browser canvas area limit.
    pub const DEFAULT_MAX_PIXELS: u64 = 16_384 * 16_384;
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            load_system_fonts: true,
            resources_dir: None,
            font_family: None,
            max_pixels: Self::DEFAULT_MAX_PIXELS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    /// Package every converted output into one ZIP instead of saving files
    /// individually.
    pub archive: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            archive: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.intake.decode_timeout_ms, 5_000);
        assert!(config.render.load_system_fonts);
        assert_eq!(config.render.max_pixels, RenderConfig::DEFAULT_MAX_PIXELS);
        assert!(!config.output.archive);
        assert_eq!(config.output.dir, PathBuf::from("."));
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"output": {"archive": true}}"#).unwrap();
        assert!(config.output.archive);
        assert_eq!(config.output.dir, PathBuf::from("."));
        assert_eq!(config.intake.decode_timeout(), Duration::from_secs(5));
    }
}
