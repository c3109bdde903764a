//! Per-category exponential smoothing of overlay geometry.
//!
//! A one-pole low-pass filter per box component:
//!
//! ```text
//! smoothed = alpha * previous + (1 - alpha) * new
//! ```
//!
//! `alpha` is the weight on history. The first sighting of a category seeds
//! the state with the raw box unchanged. Categories never interact.

use std::collections::BTreeMap;

use anyhow::{anyhow, Result};

use crate::geometry::ScreenRect;
use crate::labels::DeviceCategory;

pub const DEFAULT_SMOOTHING_FACTOR: f32 = 0.8;

#[derive(Clone, Debug)]
pub struct BoxSmoother {
    alpha: f32,
    previous: BTreeMap<DeviceCategory, ScreenRect>,
}

impl BoxSmoother {
    /// Create a smoother. `alpha` must lie in `[0, 1]`.
    pub fn new(alpha: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&alpha) {
            return Err(anyhow!("smoothing factor must be within [0, 1], got {}", alpha));
        }
        Ok(Self {
            alpha,
            previous: BTreeMap::new(),
        })
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    /// Smooth a new observation for `category` and remember the result.
    pub fn smooth(&mut self, category: DeviceCategory, raw: ScreenRect) -> ScreenRect {
        let smoothed = match self.previous.get(&category) {
            Some(previous) => previous.blend(&raw, self.alpha),
            None => raw,
        };
        self.previous.insert(category, smoothed);
        smoothed
    }

    /// Drop state for a category. No-op when absent.
    pub fn forget(&mut self, category: DeviceCategory) {
        self.previous.remove(&category);
    }

    /// Drop all state.
    pub fn reset(&mut self) {
        self.previous.clear();
    }

    pub fn tracked(&self) -> impl Iterator<Item = DeviceCategory> + '_ {
        self.previous.keys().copied()
    }

    pub fn previous(&self, category: DeviceCategory) -> Option<ScreenRect> {
        self.previous.get(&category).copied()
    }
}

impl Default for BoxSmoother {
    fn default() -> Self {
        Self {
            alpha: DEFAULT_SMOOTHING_FACTOR,
            previous: BTreeMap::new(),
        }
    }
}
