use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::roi::Roi;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub video: VideoConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VideoConfig {
    pub path: PathBuf,
    /// ffmpeg binary used to decode frames.
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,
    /// ffprobe binary used to read stream metadata.
    #[serde(default = "default_ffprobe")]
    pub ffprobe: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    /// Minimum absolute change in mean ROI intensity (0-255 scale) that counts
    /// as a detection. Equality does not fire.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default = "default_roi")]
    pub roi: Roi,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            roi: default_roi(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_save_frames")]
    pub save_frames: bool,
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            save_frames: default_save_frames(),
            dir: default_output_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    /// One of "detect", "extract" or "preview".
    #[serde(default = "default_mode")]
    pub mode: String,
    /// Frame used by the extract and preview modes.
    #[serde(default)]
    pub frame_index: u64,
    #[serde(default = "default_extract_path")]
    pub extract_path: PathBuf,
    #[serde(default = "default_preview_path")]
    pub preview_path: PathBuf,
    #[serde(default = "default_crop_path")]
    pub crop_path: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            frame_index: 0,
            extract_path: default_extract_path(),
            preview_path: default_preview_path(),
            crop_path: default_crop_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        let config = Self::parse(&content)?;
        debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
}

// Default value functions
fn default_ffmpeg() -> String {
    "ffmpeg".into()
}
fn default_ffprobe() -> String {
    "ffprobe".into()
}
fn default_threshold() -> f64 {
    0.12
}
fn default_roi() -> Roi {
    Roi::new(200, 0, 50, 380)
}
fn default_save_frames() -> bool {
    true
}
fn default_output_dir() -> PathBuf {
    "detected_frames".into()
}
fn default_mode() -> String {
    "detect".into()
}
fn default_extract_path() -> PathBuf {
    "extracted_frame.png".into()
}
fn default_preview_path() -> PathBuf {
    "roi_preview.png".into()
}
fn default_crop_path() -> PathBuf {
    "roi_crop.png".into()
}
fn default_log_level() -> String {
    "info".into()
}
