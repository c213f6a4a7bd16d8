//! Tracker output contracts.
//!
//! The detector/tracker is an external collaborator. Every frame it hands over
//! is described by these types: the capture time, an optional grayscale copy of
//! the frame and the list of tracked detections.

use chrono::NaiveDateTime;
use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Class name the detector uses for license plate regions
pub const LICENCE_CLASS: &str = "licence";

/// Axis-aligned box in pixel coordinates (top-left / bottom-right corners)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    /// True when `self` lies completely within `outer` (edges may touch)
    pub fn is_inside(&self, outer: &BoundingBox) -> bool {
        self.x1 >= outer.x1 && self.y1 >= outer.y1 && self.x2 <= outer.x2 && self.y2 <= outer.y2
    }

    /// Clamp to a `width` x `height` frame and return integer pixel bounds.
    ///
    /// Returns `None` when nothing of the box is left after clamping.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        if width == 0 || height == 0 {
            return None;
        }
        let max_x = (width - 1) as f32;
        let max_y = (height - 1) as f32;
        let x1 = self.x1.max(0.0).floor();
        let y1 = self.y1.max(0.0).floor();
        let x2 = self.x2.min(max_x).floor();
        let y2 = self.y2.min(max_y).floor();
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some((x1 as u32, y1 as u32, x2 as u32, y2 as u32))
    }
}

/// Text candidate produced by an OCR engine for one image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrCandidate {
    pub text: String,
    pub confidence: f32,
}

/// One tracked object in one frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    /// Bounding box in frame pixels
    pub bbox: BoundingBox,

    /// Numeric class id from the detector
    pub class_id: u32,

    /// Class label (e.g. "sailboat_with_cabin", "licence")
    pub class_name: String,

    /// Detection confidence (0.0 to 1.0)
    pub confidence: f32,

    /// Persistent track identifier, absent when the tracker has not locked on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_id: Option<u64>,

    /// OCR candidates read upstream, used when the frame carries no pixels
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ocr_candidates: Vec<OcrCandidate>,

    /// Image quality measured upstream for plate regions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f32>,
}

impl Detection {
    pub fn is_licence(&self) -> bool {
        self.class_name == LICENCE_CLASS
    }
}

/// Tracker output for a single frame
#[derive(Debug, Clone)]
pub struct TrackedFrame {
    /// Local wall-clock capture time
    pub captured_at: NaiveDateTime,

    /// Frame width in pixels
    pub width: u32,

    /// Frame height in pixels
    pub height: u32,

    /// Grayscale pixels; replayed tracker output has none
    pub image: Option<Arc<GrayImage>>,

    pub detections: Vec<Detection>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_inside_allows_touching_edges() {
        let boat = BoundingBox::new(10.0, 10.0, 200.0, 120.0);
        let plate = BoundingBox::new(10.0, 50.0, 80.0, 120.0);
        assert!(plate.is_inside(&boat));

        let overhanging = BoundingBox::new(5.0, 50.0, 80.0, 90.0);
        assert!(!overhanging.is_inside(&boat));
    }

    #[test]
    fn test_clamp_to_frame() {
        let bbox = BoundingBox::new(-20.0, 5.0, 700.0, 40.0);
        assert_eq!(bbox.clamp_to(640, 480), Some((0, 5, 639, 40)));

        let outside = BoundingBox::new(650.0, 5.0, 700.0, 40.0);
        assert_eq!(outside.clamp_to(640, 480), None);
        assert_eq!(bbox.clamp_to(0, 0), None);
    }

    #[test]
    fn test_detection_deserializes_without_optional_fields() {
        let json = r#"{
            "bbox": {"x1": 1.0, "y1": 2.0, "x2": 3.0, "y2": 4.0},
            "class_id": 3,
            "class_name": "licence",
            "confidence": 0.8
        }"#;
        let det: Detection = serde_json::from_str(json).unwrap();
        assert!(det.is_licence());
        assert!(det.track_id.is_none());
        assert!(det.ocr_candidates.is_empty());
    }
}
