//! Camera frames.
//!
//! - `Frame`: opaque pixel container produced by a frame source.
//!
//! Frames are ephemeral. The capture thread owns them; a detector only ever
//! borrows one for the duration of a single `detect` call. There is no `Clone`
//! so a frame cannot be retained behind the capture pipeline's back.

/// Opaque camera frame. Pixels are packed RGB, row-major.
pub struct Frame {
    data: Vec<u8>,

    pub width: u32,
    pub height: u32,

    /// Monotonic sequence number assigned by the source.
    pub seq: u64,
}

// Explicitly NOT implementing Clone.

impl Frame {
    /// Create a frame. Called by frame sources.
    pub fn new(data: Vec<u8>, width: u32, height: u32, seq: u64) -> Self {
        Self {
            data,
            width,
            height,
            seq,
        }
    }

    /// Borrow the pixel data. The slice lifetime prevents capture across calls.
    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// Raw byte length.
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Expected byte length for an RGB frame of this size.
    pub fn expected_rgb_len(&self) -> usize {
        (self.width as usize)
            .saturating_mul(self.height as usize)
            .saturating_mul(3)
    }
}

impl std::fmt::Debug for Frame {
    // Pixels are never logged.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("seq", &self.seq)
            .field("bytes", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_exposes_metadata() {
        let frame = Frame::new(vec![0u8; 12], 2, 2, 7);
        assert_eq!(frame.width, 2);
        assert_eq!(frame.height, 2);
        assert_eq!(frame.seq, 7);
        assert_eq!(frame.byte_len(), 12);
        assert_eq!(frame.expected_rgb_len(), 12);
        assert_eq!(frame.pixels().len(), 12);
    }

    #[test]
    fn debug_output_omits_pixels() {
        let frame = Frame::new(vec![42u8; 3], 1, 1, 0);
        let text = format!("{:?}", frame);
        assert!(text.contains("bytes: 3"));
        assert!(!text.contains("42"));
    }
}
