use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in frame pixel coordinates.
///
/// The rectangle is fixed for a whole scan. It has to be non-empty and lie
/// entirely inside the frame; both are checked before any frame is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roi {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Roi {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Number of samples the rectangle covers.
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    pub fn ensure_non_empty(&self) -> Result<(), RoiError> {
        if self.is_empty() {
            return Err(RoiError::Empty {
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }

    /// Checks that the rectangle is non-empty and fits a `frame_width` x
    /// `frame_height` frame. Edges are compared in u64 so `x + width` cannot wrap.
    pub fn ensure_within(&self, frame_width: u32, frame_height: u32) -> Result<(), RoiError> {
        self.ensure_non_empty()?;
        let right = u64::from(self.x) + u64::from(self.width);
        let bottom = u64::from(self.y) + u64::from(self.height);
        if right > u64::from(frame_width) || bottom > u64::from(frame_height) {
            return Err(RoiError::OutOfBounds {
                roi: *self,
                frame_width,
                frame_height,
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for Roi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "(x={}, y={}, w={}, h={})",
            self.x, self.y, self.width, self.height
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoiError {
    #[error("region of interest is empty ({width}x{height})")]
    Empty { width: u32, height: u32 },
    #[error("region of interest {roi} does not fit a {frame_width}x{frame_height} frame")]
    OutOfBounds {
        roi: Roi,
        frame_width: u32,
        frame_height: u32,
    },
}
