//! Helpers for choosing a region of interest: pull a single frame out of a
//! video and render where a rectangle lands on it.

use image::{imageops, GrayImage, Luma, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use particle_scan_common::frame::Frame;
use particle_scan_common::roi::{Roi, RoiError};
use tracing::debug;

use crate::detector::signal::luma;
use crate::source::{FrameSource, SourceError};

const OUTLINE: Rgb<u8> = Rgb([255, 0, 0]);

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Roi(#[from] RoiError),
    #[error("frame {requested} requested but the video ends after {available} frames")]
    FrameOutOfRange { requested: u64, available: u64 },
    #[error("failed to save {path}: {source}")]
    Save {
        path: String,
        source: image::ImageError,
    },
}

/// Read forward to `frame_number` and return that frame.
pub fn extract_frame<S>(source: &mut S, frame_number: u64) -> Result<Frame, ToolError>
where
    S: FrameSource + ?Sized,
{
    let mut available = 0;
    while let Some(frame) = source.next_frame()? {
        if frame.index == frame_number {
            debug!(frame_number, "frame extracted");
            return Ok(frame);
        }
        available = frame.index + 1;
    }
    Err(ToolError::FrameOutOfRange {
        requested: frame_number,
        available,
    })
}

/// Grayscale copy using the same luma weights as the detector signal.
pub fn to_gray(image: &RgbImage) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        Luma([luma(image.get_pixel(x, y))])
    })
}

/// Mean grayscale intensity of a whole image.
pub fn mean_intensity(image: &GrayImage) -> f64 {
    let total: u64 = image.pixels().map(|p| u64::from(p.0[0])).sum();
    let count = u64::from(image.width()) * u64::from(image.height());
    if count == 0 {
        return 0.0;
    }
    total as f64 / count as f64
}

pub struct RoiPreview {
    /// Full frame with the ROI outlined.
    pub annotated: RgbImage,
    /// The ROI on its own.
    pub crop: RgbImage,
}

pub fn render_roi_preview(image: &RgbImage, roi: &Roi) -> Result<RoiPreview, ToolError> {
    roi.ensure_within(image.width(), image.height())?;

    let crop = imageops::crop_imm(image, roi.x, roi.y, roi.width, roi.height).to_image();

    let mut annotated = image.clone();
    let rect = Rect::at(roi.x as i32, roi.y as i32).of_size(roi.width, roi.height);
    draw_hollow_rect_mut(&mut annotated, rect, OUTLINE);

    Ok(RoiPreview { annotated, crop })
}
