//! Still image frame source.
//!
//! Decodes one local image at connect time and replays it as a frame stream,
//! resized to the configured frame size. Useful for pointing a real model at
//! a photo of a room.

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;

use super::{FrameSource, SourceConfig, SourceStats};
use crate::frame::Frame;

pub struct StillImageSource {
    config: SourceConfig,
    pixels: Option<Vec<u8>>,
    frame_count: u64,
}

impl StillImageSource {
    pub fn new(config: SourceConfig) -> Self {
        Self {
            config,
            pixels: None,
            frame_count: 0,
        }
    }
}

impl FrameSource for StillImageSource {
    fn connect(&mut self) -> Result<()> {
        let image = image::open(&self.config.url)
            .with_context(|| format!("decode image {}", self.config.url))?;
        let rgb = image
            .resize_exact(self.config.width, self.config.height, FilterType::Triangle)
            .into_rgb8();
        self.pixels = Some(rgb.into_raw());
        log::info!(
            "StillImageSource: loaded {} at {}x{}",
            self.config.url,
            self.config.width,
            self.config.height
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        let pixels = self
            .pixels
            .as_ref()
            .ok_or_else(|| anyhow!("image source not connected; call connect() first"))?;
        self.frame_count += 1;
        Ok(Frame::new(
            pixels.clone(),
            self.config.width,
            self.config.height,
            self.frame_count,
        ))
    }

    fn is_healthy(&self) -> bool {
        self.pixels.is_some()
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.config.url.clone(),
        }
    }
}
