//! Plate reading pipeline: crop, quality gate, preprocess, read, score.

use common::detections::{BoundingBox, OcrCandidate};
use image::{imageops, GrayImage};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::config::OcrConfig;
use crate::consensus::ASSUMED_QUALITY;
use crate::diagnostics::{OcrDiagnostics, ScoredCandidate};
use crate::engine::{OcrEngine, OcrMode};
use crate::preprocess::{preprocess, AdaptiveParams};
use crate::validator::SmartValidator;

/// Method tag for boxes that leave nothing to crop
pub const METHOD_ERROR: &str = "error";
/// Method tag for crops below the quality gate
pub const METHOD_QUALITY_TOO_LOW: &str = "quality_too_low";
/// Method tag when no engine call produced text
pub const METHOD_NO_RESULTS: &str = "no_results";
/// Method tag for candidates read upstream (replayed tracker output)
pub const METHOD_UPSTREAM: &str = "upstream";

/// Outcome of reading one plate region
#[derive(Debug, Clone, PartialEq)]
pub struct PlateReading {
    /// Corrected text, empty when nothing usable was read
    pub text: String,
    /// Raw engine confidence of the chosen candidate
    pub confidence: f32,
    pub method: String,
    pub quality_score: f32,
    pub preprocessing_methods: Vec<String>,
    /// Wall-clock seconds spent on this plate
    pub processing_time: f32,
    pub final_score: f32,
}

impl PlateReading {
    fn empty(method: &str, quality_score: f32, preprocessing_methods: Vec<String>) -> Self {
        Self {
            text: String::new(),
            confidence: 0.0,
            method: method.to_string(),
            quality_score,
            preprocessing_methods,
            processing_time: 0.0,
            final_score: 0.0,
        }
    }

    pub fn has_text(&self) -> bool {
        !self.text.is_empty()
    }
}

/// A plate detection together with what was read from it
#[derive(Debug, Clone)]
pub struct PlateObservation {
    pub bbox: BoundingBox,
    pub detector_confidence: f32,
    pub reading: PlateReading,
}

impl PlateObservation {
    /// `0.2 · detector confidence + 0.8 · OCR confidence`
    pub fn combined_score(&self) -> f32 {
        self.detector_confidence * 0.2 + self.reading.confidence * 0.8
    }
}

/// Best plate lying completely inside `boat`, if any scores above zero
pub fn best_plate_for_boat<'a>(
    boat: &BoundingBox,
    plates: &'a [PlateObservation],
) -> Option<&'a PlateObservation> {
    let mut best: Option<&PlateObservation> = None;
    let mut best_score = 0.0;
    for plate in plates.iter().filter(|p| p.bbox.is_inside(boat)) {
        let score = plate.combined_score();
        if score > best_score {
            best_score = score;
            best = Some(plate);
        }
    }
    best
}

fn record_outcome(reading: &PlateReading) {
    let outcome = if reading.has_text() {
        "read"
    } else {
        reading.method.as_str()
    };
    telemetry::metrics::OCR_READINGS
        .with_label_values(&[outcome])
        .inc();
}

pub struct PlateReader {
    validator: Arc<SmartValidator>,
    engine: Arc<dyn OcrEngine>,
    config: OcrConfig,
    diagnostics: Option<Arc<OcrDiagnostics>>,
}

impl PlateReader {
    pub fn new(validator: Arc<SmartValidator>, engine: Arc<dyn OcrEngine>, config: OcrConfig) -> Self {
        Self {
            validator,
            engine,
            config,
            diagnostics: None,
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<OcrDiagnostics>) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }

    pub fn validator(&self) -> &Arc<SmartValidator> {
        &self.validator
    }

    /// Read the plate inside `bbox` of `frame`; `hour` is the local hour
    pub fn read(&self, frame: &GrayImage, bbox: &BoundingBox, hour: u32) -> PlateReading {
        let reading = self.read_region(frame, bbox, hour);
        record_outcome(&reading);
        reading
    }

    fn read_region(&self, frame: &GrayImage, bbox: &BoundingBox, hour: u32) -> PlateReading {
        let started = Instant::now();

        let Some((x1, y1, x2, y2)) = bbox.clamp_to(frame.width(), frame.height()) else {
            return PlateReading::empty(METHOD_ERROR, 0.0, Vec::new());
        };
        let crop = imageops::crop_imm(frame, x1, y1, x2 - x1, y2 - y1).to_image();

        let quality = crate::quality::frame_quality(&crop);
        if quality < self.config.min_quality {
            debug!(quality, min = self.config.min_quality, "plate crop below quality gate");
            return PlateReading::empty(METHOD_QUALITY_TOO_LOW, quality, Vec::new());
        }

        let params = AdaptiveParams::for_conditions(hour, self.config.light);
        let prepared = preprocess(&crop, params);

        let mut candidates = Vec::new();
        for (index, variant) in prepared
            .variants
            .iter()
            .take(self.config.max_variants)
            .enumerate()
        {
            for mode in OcrMode::ALL {
                let call_started = Instant::now();
                let results = match self.engine.read_text(variant, mode) {
                    Ok(results) => results,
                    Err(e) => {
                        warn!(engine = self.engine.id(), mode = %mode, variant = index, error = %e, "OCR attempt failed");
                        continue;
                    }
                };
                let execution_time = call_started.elapsed().as_secs_f32();

                for candidate in results {
                    let text = candidate.text.trim();
                    if text.is_empty() {
                        continue;
                    }
                    candidates.push(ScoredCandidate {
                        reading: self.validator.process(
                            text,
                            candidate.confidence,
                            &mode.method_tag(index),
                            quality,
                        ),
                        execution_time,
                    });
                }
            }
        }

        let mut reading = self.select_best(&candidates, quality, prepared.methods, Some(&crop));
        reading.processing_time = started.elapsed().as_secs_f32();
        telemetry::metrics::OCR_PROCESSING_TIME.observe(reading.processing_time as f64);
        reading
    }

    /// Score candidates that were read upstream (no pixels available)
    pub fn read_candidates(&self, candidates: &[OcrCandidate], quality: Option<f32>) -> PlateReading {
        let reading = self.score_candidates(candidates, quality);
        record_outcome(&reading);
        reading
    }

    fn score_candidates(&self, candidates: &[OcrCandidate], quality: Option<f32>) -> PlateReading {
        let quality = quality.unwrap_or(ASSUMED_QUALITY);
        if quality < self.config.min_quality {
            return PlateReading::empty(METHOD_QUALITY_TOO_LOW, quality, Vec::new());
        }

        let scored: Vec<ScoredCandidate> = candidates
            .iter()
            .filter(|c| !c.text.trim().is_empty())
            .map(|c| ScoredCandidate {
                reading: self
                    .validator
                    .process(c.text.trim(), c.confidence, METHOD_UPSTREAM, quality),
                execution_time: 0.0,
            })
            .collect();

        self.select_best(&scored, quality, Vec::new(), None)
    }

    fn select_best(
        &self,
        candidates: &[ScoredCandidate],
        quality: f32,
        preprocessing_methods: Vec<String>,
        crop: Option<&GrayImage>,
    ) -> PlateReading {
        let best = candidates.iter().fold(None::<&ScoredCandidate>, |best, c| match best {
            Some(b) if b.reading.final_score >= c.reading.final_score => Some(b),
            _ => Some(c),
        });

        let Some(best) = best else {
            return PlateReading::empty(METHOD_NO_RESULTS, quality, preprocessing_methods);
        };

        telemetry::metrics::OCR_VALIDATION_SCORE
            .with_label_values(&[&best.reading.text_type.to_string()])
            .observe(best.reading.final_score as f64);

        if let Some(diagnostics) = &self.diagnostics {
            if let Some(crop) = crop {
                if best.reading.final_score < self.config.difficult_score {
                    diagnostics.record_difficult_case(crop, candidates);
                }
            }
            diagnostics.record_reading(&best.reading, best.execution_time);
        }

        debug!(summary = %best.reading.summary(), "plate reading selected");

        PlateReading {
            text: best.reading.corrected_text.clone(),
            confidence: best.reading.confidence,
            method: best.reading.method.clone(),
            quality_score: quality,
            preprocessing_methods,
            processing_time: 0.0,
            final_score: best.reading.final_score,
        }
    }
}
