mod result;
mod source;

pub use result::{BoundingBox, Detection, FrameDetections};
pub use source::DetectionSource;
