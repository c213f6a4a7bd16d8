//! OCR engine seam.
//!
//! The recognizer itself is an external collaborator; the pipeline only
//! needs "image in, text candidates out" in one of four reading modes.

use anyhow::Result;
use common::detections::OcrCandidate;
use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

/// Reading mode passed to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrMode {
    /// Plain text, single line
    Standard,
    /// Per-region text with confidences
    Detailed,
    /// Regions merged into paragraphs
    Paragraph,
    /// Detailed regions merged into paragraphs
    Enhanced,
}

impl OcrMode {
    pub const ALL: [OcrMode; 4] = [
        OcrMode::Standard,
        OcrMode::Detailed,
        OcrMode::Paragraph,
        OcrMode::Enhanced,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OcrMode::Standard => "standard",
            OcrMode::Detailed => "detailed",
            OcrMode::Paragraph => "paragraph",
            OcrMode::Enhanced => "enhanced",
        }
    }

    /// Method tag for a reading taken from preprocessing variant `index`
    pub fn method_tag(&self, index: usize) -> String {
        format!("{}_img{}", self.as_str(), index)
    }
}

impl fmt::Display for OcrMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Text recognizer used by the plate reader
pub trait OcrEngine: Send + Sync {
    /// Engine identifier for logs
    fn id(&self) -> &'static str;

    /// Read text candidates from a grayscale image
    fn read_text(&self, image: &GrayImage, mode: OcrMode) -> Result<Vec<OcrCandidate>>;
}

/// Engine returning preconfigured candidates per mode.
///
/// Used where no recognizer is available (replayed tracker output) and in
/// tests.
#[derive(Default)]
pub struct ScriptedOcrEngine {
    responses: HashMap<OcrMode, Vec<OcrCandidate>>,
    failing: Vec<OcrMode>,
    calls: Mutex<usize>,
}

impl ScriptedOcrEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(mut self, mode: OcrMode, text: &str, confidence: f32) -> Self {
        self.responses.entry(mode).or_default().push(OcrCandidate {
            text: text.to_string(),
            confidence,
        });
        self
    }

    /// Make every call in `mode` fail
    pub fn with_failure(mut self, mode: OcrMode) -> Self {
        self.failing.push(mode);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().map(|c| *c).unwrap_or_default()
    }
}

impl OcrEngine for ScriptedOcrEngine {
    fn id(&self) -> &'static str {
        "scripted"
    }

    fn read_text(&self, _image: &GrayImage, mode: OcrMode) -> Result<Vec<OcrCandidate>> {
        if let Ok(mut calls) = self.calls.lock() {
            *calls += 1;
        }
        if self.failing.contains(&mode) {
            anyhow::bail!("scripted failure in {} mode", mode);
        }
        Ok(self.responses.get(&mode).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_tags() {
        assert_eq!(OcrMode::Detailed.method_tag(3), "detailed_img3");
        assert_eq!(OcrMode::ALL.len(), 4);
    }

    #[test]
    fn test_scripted_engine() {
        let engine = ScriptedOcrEngine::new()
            .with_response(OcrMode::Standard, "AB-123", 0.7)
            .with_failure(OcrMode::Paragraph);
        let image = GrayImage::new(4, 4);

        let out = engine.read_text(&image, OcrMode::Standard).unwrap();
        assert_eq!(out.len(), 1);
        assert!(engine.read_text(&image, OcrMode::Detailed).unwrap().is_empty());
        assert!(engine.read_text(&image, OcrMode::Paragraph).is_err());
        assert_eq!(engine.calls(), 3);
    }
}
