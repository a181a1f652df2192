use image::RgbImage;
use serde::Serialize;

/// A decoded video frame.
///
/// Frames are ephemeral: the scanner reduces each one to a single signal value
/// and drops it, unless a detection hands it to a sink first.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Zero-based position in the stream.
    pub index: u64,
    pub image: RgbImage,
}

impl Frame {
    pub fn new(index: u64, image: RgbImage) -> Self {
        Self { index, image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Label used by sinks to name this frame's output, e.g. `detected_frame_42`.
    pub fn detection_label(&self) -> String {
        format!("detected_frame_{}", self.index)
    }
}

/// One abrupt intensity change between a frame and its predecessor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DetectionEvent {
    /// `frame_index / frame_rate`.
    pub timestamp_secs: f64,
    pub frame_index: u64,
    /// Absolute difference of ROI mean intensity against the previous frame.
    pub intensity_delta: f64,
}
