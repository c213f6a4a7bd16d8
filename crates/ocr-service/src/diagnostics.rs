//! OCR diagnostics on disk.
//!
//! Two artifacts help tune the reader offline: a JSON-lines log with one
//! entry per best reading, and "difficult cases" (crop plus candidate
//! analysis) whenever the best reading scored poorly. Both are best effort:
//! failures are logged and never reach the caller.

use anyhow::{Context, Result};
use chrono::Local;
use image::GrayImage;
use serde::Serialize;
use serde_json::json;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

use crate::validator::OcrReading;

pub const PERFORMANCE_LOG: &str = "ocr_performance.jsonl";

/// Candidate considered for a plate, with the time its engine call took
#[derive(Debug, Clone, Serialize)]
pub struct ScoredCandidate {
    pub reading: OcrReading,
    pub execution_time: f32,
}

pub struct OcrDiagnostics {
    log_path: PathBuf,
    difficult_dir: PathBuf,
    // Serialises appends from camera threads sharing one log file
    write_lock: Mutex<()>,
}

impl OcrDiagnostics {
    pub fn new(log_dir: impl Into<PathBuf>, difficult_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_path: log_dir.into().join(PERFORMANCE_LOG),
            difficult_dir: difficult_dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Append one performance entry for the chosen reading
    pub fn record_reading(&self, reading: &OcrReading, execution_time: f32) {
        if let Err(e) = self.append_reading(reading, execution_time) {
            warn!(error = %e, path = %self.log_path.display(), "failed to write OCR performance log");
        }
    }

    /// Store the crop and all candidates of a poorly read plate
    pub fn record_difficult_case(&self, crop: &GrayImage, candidates: &[ScoredCandidate]) {
        match self.write_difficult_case(crop, candidates) {
            Ok(stem) => debug!(case = %stem, candidates = candidates.len(), "saved difficult OCR case"),
            Err(e) => warn!(error = %e, "failed to save difficult OCR case"),
        }
    }

    fn append_reading(&self, reading: &OcrReading, execution_time: f32) -> Result<()> {
        let entry = json!({
            "timestamp": Local::now().timestamp_millis() as f64 / 1000.0,
            "original_text": reading.text,
            "corrected_text": reading.corrected_text,
            "text_type": reading.text_type,
            "confidence": reading.confidence,
            "format_confidence": reading.format_confidence,
            "final_score": reading.final_score,
            "method": reading.method,
            "execution_time": execution_time,
            "quality_score": reading.quality_score,
            "validation_details": reading.details,
            "text_length": reading.corrected_text.chars().count(),
        });

        let _guard = self.write_lock.lock().ok();
        if let Some(dir) = self.log_path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .with_context(|| format!("failed to open {}", self.log_path.display()))?;
        writeln!(file, "{}", entry)?;
        Ok(())
    }

    fn write_difficult_case(&self, crop: &GrayImage, candidates: &[ScoredCandidate]) -> Result<String> {
        fs::create_dir_all(&self.difficult_dir)
            .with_context(|| format!("failed to create {}", self.difficult_dir.display()))?;

        let stamp = Local::now().format("%Y%m%d_%H%M%S_%3f").to_string();
        let max_score = candidates
            .iter()
            .map(|c| c.reading.final_score)
            .fold(0.0f32, f32::max);

        crop.save(self.difficult_dir.join(format!("{}_crop.png", stamp)))
            .context("failed to write crop")?;

        let analysis = json!({
            "timestamp": stamp,
            "max_final_score": max_score,
            "candidates_count": candidates.len(),
            "candidates": candidates.iter().map(|c| json!({
                "original_text": c.reading.text,
                "corrected_text": c.reading.corrected_text,
                "text_type": c.reading.text_type,
                "confidence": c.reading.confidence,
                "format_confidence": c.reading.format_confidence,
                "final_score": c.reading.final_score,
                "method": c.reading.method,
                "validation_details": c.reading.details,
            })).collect::<Vec<_>>(),
        });
        fs::write(
            self.difficult_dir.join(format!("{}_analysis.json", stamp)),
            serde_json::to_string_pretty(&analysis)?,
        )
        .context("failed to write analysis")?;

        Ok(stamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::{KnownIdentifiers, SmartValidator};

    #[test]
    fn test_performance_log_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let diagnostics = OcrDiagnostics::new(dir.path().join("logs"), dir.path().join("cases"));
        let validator = SmartValidator::new(KnownIdentifiers::default()).unwrap();
        let reading = validator.process("AB-A 17", 0.8, "detailed_img0", 160.0);

        diagnostics.record_reading(&reading, 0.02);
        diagnostics.record_reading(&reading, 0.03);

        let raw = std::fs::read_to_string(diagnostics.log_path()).unwrap();
        let lines: Vec<_> = raw.lines().collect();
        assert_eq!(lines.len(), 2);
        let entry: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(entry["original_text"], "AB-A 17");
        assert_eq!(entry["method"], "detailed_img0");
        assert_eq!(entry["text_type"], "license_plate");
    }

    #[test]
    fn test_difficult_case_writes_crop_and_analysis() {
        let dir = tempfile::tempdir().unwrap();
        let cases = dir.path().join("cases");
        let diagnostics = OcrDiagnostics::new(dir.path().join("logs"), &cases);
        let validator = SmartValidator::new(KnownIdentifiers::default()).unwrap();
        let candidates = vec![ScoredCandidate {
            reading: validator.process("?x", 0.1, "standard_img0", 110.0),
            execution_time: 0.01,
        }];

        diagnostics.record_difficult_case(&GrayImage::new(10, 4), &candidates);

        let names: Vec<String> = std::fs::read_dir(&cases)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert!(names.iter().any(|n| n.ends_with("_crop.png")));
        assert!(names.iter().any(|n| n.ends_with("_analysis.json")));
    }
}
