use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::preprocess::LightCondition;

#[derive(Debug, Clone)]
pub struct OcrConfig {
    /// Crops below this quality are not read at all
    pub min_quality: f32,

    /// How many preprocessing variants are handed to the engine
    pub max_variants: usize,

    /// Lighting hint for the adaptive preprocessing parameters
    pub light: LightCondition,

    /// Readings kept per track for the consensus vote
    pub history_capacity: usize,

    /// Tracks without a new reading for this long are forgotten
    pub track_max_age: Duration,

    /// How often camera loops evict stale consensus tracks
    pub evict_interval: Duration,

    /// Best readings scoring below this are kept as difficult cases
    pub difficult_score: f32,

    /// Directory for the JSONL performance log; `None` disables diagnostics
    pub diagnostics_dir: Option<PathBuf>,

    /// Directory for difficult-case crops and analyses
    pub difficult_dir: PathBuf,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            min_quality: 100.0,
            max_variants: 6,
            light: LightCondition::Normal,
            history_capacity: 5,
            track_max_age: Duration::from_secs(300),
            evict_interval: Duration::from_secs(60),
            difficult_score: 0.5,
            diagnostics_dir: None,
            difficult_dir: PathBuf::from("difficult_cases"),
        }
    }
}

impl OcrConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let light = match env::var("OCR_LIGHT")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "dark" => LightCondition::Dark,
            "bright" => LightCondition::Bright,
            _ => LightCondition::Normal,
        };

        let diagnostics_enabled = env::var("OCR_DIAGNOSTICS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(true);

        Self {
            min_quality: env::var("OCR_MIN_QUALITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.min_quality),
            max_variants: env::var("OCR_MAX_VARIANTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_variants),
            light,
            history_capacity: env::var("OCR_HISTORY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.history_capacity),
            track_max_age: env::var("OCR_TRACK_MAX_AGE_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.track_max_age),
            evict_interval: env::var("OCR_EVICT_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.evict_interval),
            difficult_score: defaults.difficult_score,
            diagnostics_dir: diagnostics_enabled.then(|| {
                env::var("OCR_LOG_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("logs"))
            }),
            difficult_dir: env::var("OCR_DIFFICULT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.difficult_dir),
        }
    }
}
