use image::{Rgb, RgbImage};
use particle_scan_common::frame::Frame;
use std::collections::VecDeque;

use super::{FrameSource, SourceError};

/// In-memory frame source for exercising the scanner without a video file.
pub struct MemorySource {
    width: u32,
    height: u32,
    frame_rate: f64,
    total: u64,
    frames: VecDeque<RgbImage>,
    next_index: u64,
    /// Fail with a decode error once this many frames have been handed out.
    fail_after: Option<u64>,
}

impl MemorySource {
    pub fn new(width: u32, height: u32, frame_rate: f64, frames: Vec<RgbImage>) -> Self {
        Self {
            width,
            height,
            frame_rate,
            total: frames.len() as u64,
            frames: frames.into(),
            next_index: 0,
            fail_after: None,
        }
    }

    /// Uniform gray frames, one per entry of `levels`. The ROI mean of each
    /// frame equals its level exactly.
    pub fn uniform(width: u32, height: u32, frame_rate: f64, levels: &[u8]) -> Self {
        let frames = levels
            .iter()
            .map(|&v| RgbImage::from_pixel(width, height, Rgb([v, v, v])))
            .collect();
        Self::new(width, height, frame_rate, frames)
    }

    pub fn failing_after(mut self, frames: u64) -> Self {
        self.fail_after = Some(frames);
        self
    }

    pub fn frames_read(&self) -> u64 {
        self.next_index
    }
}

impl FrameSource for MemorySource {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    fn frame_count(&self) -> Option<u64> {
        Some(self.total)
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        if self.fail_after == Some(self.next_index) {
            return Err(SourceError::Decode("simulated decode failure".into()));
        }
        let Some(image) = self.frames.pop_front() else {
            return Ok(None);
        };
        let frame = Frame::new(self.next_index, image);
        self.next_index += 1;
        Ok(Some(frame))
    }
}
