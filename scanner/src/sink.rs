use particle_scan_common::frame::Frame;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Destination for frames selected by the detector.
///
/// Called once per detection event. Errors are reported back to the scanner,
/// which logs them and keeps going.
pub trait FrameSink {
    fn persist(&mut self, frame: &Frame, label: &str) -> Result<(), PersistError>;

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "unnamed"
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("failed to create output directory {0}: {1}")]
    CreateDir(String, std::io::Error),
    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        source: image::ImageError,
    },
}

/// Writes each frame as `{dir}/{label}.png`.
pub struct PngDirectorySink {
    dir: PathBuf,
}

impl PngDirectorySink {
    /// Creates `dir` (and parents) if it does not exist.
    pub fn new(dir: &Path) -> Result<Self, PersistError> {
        std::fs::create_dir_all(dir)
            .map_err(|e| PersistError::CreateDir(dir.display().to_string(), e))?;
        debug!(dir = %dir.display(), "output directory ready");
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn path_for(&self, label: &str) -> PathBuf {
        self.dir.join(format!("{label}.png"))
    }
}

impl FrameSink for PngDirectorySink {
    fn persist(&mut self, frame: &Frame, label: &str) -> Result<(), PersistError> {
        let path = self.path_for(label);
        frame.image.save(&path).map_err(|e| PersistError::Write {
            path: path.display().to_string(),
            source: e,
        })?;
        info!(path = %path.display(), frame_index = frame.index, "frame saved");
        Ok(())
    }

    fn name(&self) -> &str {
        "png-directory"
    }
}

/// Drops every frame. Used when saving detected frames is disabled.
pub struct DiscardSink;

impl FrameSink for DiscardSink {
    fn persist(&mut self, frame: &Frame, label: &str) -> Result<(), PersistError> {
        debug!(frame_index = frame.index, label, "frame not saved (discard sink)");
        Ok(())
    }

    fn name(&self) -> &str {
        "discard"
    }
}
