//! Frame detection sources.
//!
//! This module provides the sources the frame loop pulls detections from:
//! - Local JSON-lines replay of recorded detector output
//! - Synthetic sweep (`stub://`) for demos
//! - Scripted in-memory frames (testing)
//!
//! Capture, decoding and model inference live outside this crate; a source
//! only hands over `FrameDetections` in detector order.

pub mod file;
mod scripted;

pub use file::{parse_frame_line, FileConfig, FileSource, FileStats};
pub use scripted::ScriptedSource;
