use anyhow::Result;

use super::result::FrameDetections;

/// Producer of per-frame detections.
///
/// Implementations wrap whatever captures frames and runs the detector. The
/// frame loop blocks on `next_frame`, so an implementation may block on
/// capture and inference.
pub trait DetectionSource {
    /// Source identifier used in logs.
    fn name(&self) -> &str;

    /// Detections for the next frame.
    ///
    /// `Ok(None)` signals end of stream. Any `Err` is fatal to the frame loop.
    fn next_frame(&mut self) -> Result<Option<FrameDetections>>;

    /// Optional connect hook, called once before the first frame.
    fn connect(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<S: DetectionSource + ?Sized> DetectionSource for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn next_frame(&mut self) -> Result<Option<FrameDetections>> {
        (**self).next_frame()
    }

    fn connect(&mut self) -> Result<()> {
        (**self).connect()
    }
}
