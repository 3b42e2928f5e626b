//! Converter configuration

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConvertError, Result};

/// Subtitle overlay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Explicit font file; takes precedence over the candidates
    pub font_path: Option<PathBuf>,

    /// Bold fonts tried in order when no explicit font is set
    pub font_candidates: Vec<PathBuf>,

    /// Font size in pixels
    pub font_size: f32,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            font_path: None,
            font_candidates: [
                "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
                "/usr/share/fonts/dejavu/DejaVuSans-Bold.ttf",
                "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
                "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
                "/usr/share/fonts/liberation/LiberationSans-Bold.ttf",
                "/System/Library/Fonts/Supplemental/Arial Bold.ttf",
                "C:\\Windows\\Fonts\\arialbd.ttf",
            ]
            .into_iter()
            .map(PathBuf::from)
            .collect(),
            font_size: 40.0,
        }
    }
}

/// Output document configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory the document is written to
    pub directory: PathBuf,

    /// Document file extension
    pub extension: String,

    /// Flate-compress document streams
    pub compress: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            extension: "pdf".to_string(),
            compress: true,
        }
    }
}

impl OutputConfig {
    /// Output path for a video: same stem, document extension
    pub fn output_path(&self, video: &Path) -> Result<PathBuf> {
        let stem = video.file_stem().ok_or_else(|| {
            ConvertError::InvalidInput(format!("video path has no file name: {:?}", video))
        })?;
        let mut name = stem.to_os_string();
        name.push(".");
        name.push(&self.extension);
        Ok(self.directory.join(name))
    }
}

/// Converter configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: Option<String>,

    /// Overlay configuration
    pub overlay: OverlayConfig,

    /// Output configuration
    pub output: OutputConfig,
}

impl ConverterConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config: ConverterConfig = toml::from_str(&content)
            .map_err(|e| ConvertError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConvertError::Config(e.to_string()))?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.overlay.font_size.is_finite() && self.overlay.font_size > 0.0) {
            return Err(ConvertError::Config(format!(
                "overlay.font_size must be positive, got {}",
                self.overlay.font_size
            )));
        }
        if self.output.extension.trim().is_empty() {
            return Err(ConvertError::Config("output.extension is empty".to_string()));
        }
        Ok(())
    }
}
