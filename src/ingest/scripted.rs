use anyhow::{anyhow, Result};
use std::collections::VecDeque;

use crate::detect::{DetectionSource, FrameDetections};

/// In-memory source that plays back a fixed list of frames.
///
/// An optional failure can be scheduled after the last frame to exercise the
/// frame loop's error path.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    frames: VecDeque<FrameDetections>,
    fail_at_end: Option<String>,
}

impl ScriptedSource {
    pub fn new(frames: impl IntoIterator<Item = FrameDetections>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
            fail_at_end: None,
        }
    }

    /// Return an error instead of end-of-stream once the frames run out.
    pub fn failing_with(mut self, message: &str) -> Self {
        self.fail_at_end = Some(message.to_string());
        self
    }

    pub fn push(&mut self, frame: FrameDetections) {
        self.frames.push_back(frame);
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl DetectionSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    fn next_frame(&mut self) -> Result<Option<FrameDetections>> {
        if let Some(frame) = self.frames.pop_front() {
            return Ok(Some(frame));
        }
        match &self.fail_at_end {
            Some(message) => Err(anyhow!("{}", message)),
            None => Ok(None),
        }
    }
}
