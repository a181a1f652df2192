pub mod ffmpeg;
#[cfg(test)]
pub mod memory;
pub mod probe;

use particle_scan_common::frame::Frame;

/// Ordered supply of decoded frames.
///
/// Implementations yield every frame exactly once, in stream order, with
/// indices counting up from zero. `Ok(None)` marks the normal end of stream.
pub trait FrameSource {
    /// Frame size in pixels as `(width, height)`.
    fn dimensions(&self) -> (u32, u32);

    /// Frames per second reported by the container. May be 0.0 when unknown.
    fn frame_rate(&self) -> f64;

    /// Total frame count when the container reports one.
    fn frame_count(&self) -> Option<u64>;

    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError>;
}

/// The video could not be opened or decoded.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("failed to probe {path}: {reason}")]
    Probe { path: String, reason: String },
    #[error("no video stream found in {0}")]
    NoVideoStream(String),
    #[error("failed to spawn ffmpeg: {0}")]
    Spawn(String),
    #[error("failed to read frame from ffmpeg: {0}")]
    Read(#[from] std::io::Error),
    #[error("ffmpeg failed to decode video: {0}")]
    Decode(String),
}
