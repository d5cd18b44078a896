use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::Point;

/// Normalized `xywh` box as reported by the detector.
///
/// `x` and `y` are the box centre, `w` and `h` its extent, all in `0..=1`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    pub fn center(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// One object observed in one frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(rename = "label")]
    pub class_label: String,
    pub confidence: f32,
    #[serde(rename = "box", with = "box_array")]
    pub bbox: BoundingBox,
}

impl Detection {
    /// Build a detection, rejecting non-finite values and clamping the rest into `0..=1`.
    pub fn new(class_label: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Result<Self> {
        Self {
            class_label: class_label.into(),
            confidence,
            bbox,
        }
        .normalized()
    }

    pub fn normalized(mut self) -> Result<Self> {
        let fields = [
            self.confidence,
            self.bbox.x,
            self.bbox.y,
            self.bbox.w,
            self.bbox.h,
        ];
        if fields.iter().any(|v| !v.is_finite()) {
            return Err(anyhow!(
                "detection '{}' has non-finite confidence or box",
                self.class_label
            ));
        }
        self.confidence = self.confidence.clamp(0.0, 1.0);
        self.bbox.x = self.bbox.x.clamp(0.0, 1.0);
        self.bbox.y = self.bbox.y.clamp(0.0, 1.0);
        self.bbox.w = self.bbox.w.clamp(0.0, 1.0);
        self.bbox.h = self.bbox.h.clamp(0.0, 1.0);
        Ok(self)
    }

    pub fn center(&self) -> Point {
        self.bbox.center()
    }
}

/// Detections for a single frame, in detector output order.
///
/// The order is significant: the tracker's exit anchor is last-write-wins
/// across this sequence.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameDetections {
    pub detections: Vec<Detection>,
}

impl FrameDetections {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self { detections }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Detection> {
        self.detections.iter()
    }
}

impl From<Vec<Detection>> for FrameDetections {
    fn from(detections: Vec<Detection>) -> Self {
        Self::new(detections)
    }
}

mod box_array {
    use super::BoundingBox;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(b: &BoundingBox, s: S) -> Result<S::Ok, S::Error> {
        [b.x, b.y, b.w, b.h].serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<BoundingBox, D::Error> {
        let [x, y, w, h] = <[f32; 4]>::deserialize(d)?;
        Ok(BoundingBox { x, y, w, h })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_out_of_range_values() {
        let det = Detection::new("Rexona Roll On", 1.2, BoundingBox::new(-0.1, 0.5, 1.5, 0.2))
            .expect("finite detection");
        assert_eq!(det.confidence, 1.0);
        assert_eq!(det.bbox.x, 0.0);
        assert_eq!(det.bbox.w, 1.0);
    }

    #[test]
    fn rejects_nan_confidence() {
        assert!(Detection::new("x", f32::NAN, BoundingBox::new(0.5, 0.5, 0.1, 0.1)).is_err());
    }

    #[test]
    fn parses_wire_shape() {
        let det: Detection =
            serde_json::from_str(r#"{"label": "Capri-Sun Safari Fruits", "confidence": 0.81, "box": [0.2, 0.5, 0.1, 0.3]}"#)
                .expect("parse detection");
        assert_eq!(det.class_label, "Capri-Sun Safari Fruits");
        assert_eq!(det.center(), Point::new(0.2, 0.5));
    }
}
