//! Synthetic frame source.
//!
//! `stub://<name>` URLs produce generated RGB frames of the configured size.
//! `stub://offline` never connects, standing in for a device without a camera.

use anyhow::{anyhow, Result};
use rand::Rng;

use super::{FrameSource, SourceConfig, SourceStats};
use crate::frame::Frame;

const OFFLINE_URL: &str = "stub://offline";

pub struct SyntheticSource {
    config: SourceConfig,
    connected: bool,
    frame_count: u64,
    /// Simulated scene state, shifts every 50 frames.
    scene_state: u8,
}

impl SyntheticSource {
    pub fn new(config: SourceConfig) -> Self {
        Self {
            config,
            connected: false,
            frame_count: 0,
            scene_state: 0,
        }
    }

    fn generate_pixels(&mut self) -> Vec<u8> {
        let pixel_count = (self.config.width as usize) * (self.config.height as usize) * 3;

        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }

        // Sensor noise keeps consecutive frames distinct.
        let noise: u8 = rand::thread_rng().gen_range(0..4);
        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count + self.scene_state as u64 + noise as u64)
                % 256) as u8;
        }
        pixels
    }
}

impl FrameSource for SyntheticSource {
    fn connect(&mut self) -> Result<()> {
        if self.config.url == OFFLINE_URL {
            return Err(anyhow!("no camera available at {}", self.config.url));
        }
        self.connected = true;
        log::info!("SyntheticSource: connected to {}", self.config.url);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        if !self.connected {
            return Err(anyhow!("synthetic source not connected; call connect() first"));
        }
        self.frame_count += 1;
        let pixels = self.generate_pixels();
        Ok(Frame::new(
            pixels,
            self.config.width,
            self.config.height,
            self.frame_count,
        ))
    }

    fn is_healthy(&self) -> bool {
        self.connected
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.config.url.clone(),
        }
    }
}
