use anyhow::Result;

use crate::detect::result::RawDetection;
use crate::frame::Frame;

/// Detector backend trait.
///
/// A backend turns one borrowed frame into a list of raw detections. It runs on
/// the inference worker, never on the thread that owns overlay state, and is
/// invoked with at most one frame in flight.
///
/// Implementations must treat the frame as read-only and ephemeral: nothing
/// derived from the pixel slice may outlive the `detect` call except the
/// returned detections.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    ///
    /// An `Err` drops this pass only; the detection loop keeps running.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>>;

    /// Load the model and verify it is usable.
    ///
    /// An error here disables the detection screen for the session.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
