//! Detection geometry.
//!
//! Detectors report boxes in a normalized, bottom-left-origin unit square.
//! Overlays live in screen pixels with a top-left origin. `NormalizedRect::to_screen`
//! is the only place the two spaces meet.

use serde::{Deserialize, Serialize};

/// Bounding box relative to frame dimensions, bottom-left origin.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl NormalizedRect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rescale to the view and flip the vertical axis to a top-left origin.
    pub fn to_screen(&self, view: ViewSize) -> ScreenRect {
        ScreenRect {
            x: self.x * view.width,
            y: (1.0 - self.y - self.height) * view.height,
            width: self.width * view.width,
            height: self.height * view.height,
        }
    }
}

/// Rectangle in view pixels, top-left origin.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScreenRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl ScreenRect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn contains(&self, px: f32, py: f32) -> bool {
        px >= self.x && px <= self.x + self.width && py >= self.y && py <= self.y + self.height
    }

    /// Component-wise `alpha * self + (1 - alpha) * next`.
    ///
    /// Evaluated as `next + alpha * (self - next)` so identical inputs return
    /// exactly `next`.
    pub fn blend(&self, next: &ScreenRect, alpha: f32) -> ScreenRect {
        let mix = |prev: f32, new: f32| new + alpha * (prev - new);
        ScreenRect {
            x: mix(self.x, next.x),
            y: mix(self.y, next.y),
            width: mix(self.width, next.width),
            height: mix(self.height, next.height),
        }
    }
}

/// Size of the view overlays are drawn into.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ViewSize {
    pub width: f32,
    pub height: f32,
}

impl ViewSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }
}

impl Default for ViewSize {
    fn default() -> Self {
        Self {
            width: 390.0,
            height: 844.0,
        }
    }
}
