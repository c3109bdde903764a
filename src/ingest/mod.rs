//! Frame sources.
//!
//! This module provides the sources the capture thread pulls frames from:
//! - Synthetic `stub://` source (tests, demo)
//! - Still image source (feature: ingest-image)
//!
//! All sources produce `Frame` instances. Sources do not pace themselves; the
//! capture thread decimates to the configured rate and drops frames while an
//! inference is in flight.
//!
//! Sources MUST NOT:
//! - Store frames to disk
//! - Retain frames after handing them to the capture thread

use anyhow::{anyhow, Result};

#[cfg(feature = "ingest-image")]
pub mod still;
pub mod synthetic;

#[cfg(feature = "ingest-image")]
pub use still::StillImageSource;
pub use synthetic::SyntheticSource;

use crate::frame::Frame;

/// Configuration for a frame source.
#[derive(Clone, Debug)]
pub struct SourceConfig {
    /// Source URL: `stub://<name>` or a local image path.
    pub url: String,
    /// Frame width (synthetic frames).
    pub width: u32,
    /// Frame height (synthetic frames).
    pub height: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: "stub://camera".to_string(),
            width: 640,
            height: 480,
        }
    }
}

/// Statistics for a frame source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub source: String,
}

/// A camera capture pipeline as seen by the detection loop.
pub trait FrameSource: Send {
    /// Open the device. An error here means the camera is unavailable.
    fn connect(&mut self) -> Result<()>;

    /// Capture the next frame.
    fn next_frame(&mut self) -> Result<Frame>;

    /// Check if the source is healthy.
    fn is_healthy(&self) -> bool;

    /// Get frame statistics.
    fn stats(&self) -> SourceStats;
}

/// Build a frame source for a configured URL.
pub fn open_source(config: SourceConfig) -> Result<Box<dyn FrameSource>> {
    if config.url.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::new(config)));
    }
    if config.url.contains("://") {
        return Err(anyhow!(
            "unsupported frame source '{}'; expected stub:// or a local image path",
            config.url
        ));
    }
    #[cfg(feature = "ingest-image")]
    {
        Ok(Box::new(StillImageSource::new(config)))
    }
    #[cfg(not(feature = "ingest-image"))]
    {
        Err(anyhow!("image sources require the ingest-image feature"))
    }
}
