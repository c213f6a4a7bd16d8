//! Multi-frame OCR consensus.
//!
//! A boat is usually visible for many frames and its plate is read many
//! times. The tracker keeps the last few scored readings per track and
//! resolves them into a single answer by majority weighted with the
//! validator's final score.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::validator::{OcrReading, SmartValidator};

/// Image quality assumed for readings that arrive without a crop
pub const ASSUMED_QUALITY: f32 = 150.0;

/// Method tag returned for tracks without any reading
pub const NO_DATA_METHOD: &str = "no_data";

/// Resolved reading of a track
#[derive(Debug, Clone, PartialEq)]
pub struct ConsensusResult {
    pub text: String,
    pub confidence: f32,
    pub method: String,
}

impl ConsensusResult {
    fn empty() -> Self {
        Self {
            text: String::new(),
            confidence: 0.0,
            method: NO_DATA_METHOD.to_string(),
        }
    }
}

pub struct ConsensusTracker {
    validator: Arc<SmartValidator>,
    capacity: usize,
    history: HashMap<u64, VecDeque<(OcrReading, Instant)>>,
}

impl ConsensusTracker {
    pub fn new(validator: Arc<SmartValidator>, capacity: usize) -> Self {
        Self {
            validator,
            capacity: capacity.max(1),
            history: HashMap::new(),
        }
    }

    /// Record a reading for `track_id`; empty text is ignored
    pub fn add_detection(&mut self, track_id: u64, text: &str, confidence: f32, method: &str) {
        self.add_detection_at(track_id, text, confidence, method, Instant::now());
    }

    pub fn add_detection_at(
        &mut self,
        track_id: u64,
        text: &str,
        confidence: f32,
        method: &str,
        observed_at: Instant,
    ) {
        if text.is_empty() {
            return;
        }
        let reading = self
            .validator
            .process(text, confidence, method, ASSUMED_QUALITY);
        let entries = self.history.entry(track_id).or_default();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back((reading, observed_at));
    }

    /// Best reading for `track_id` over its history
    pub fn resolve(&self, track_id: u64) -> ConsensusResult {
        let entries = match self.history.get(&track_id) {
            Some(entries) if !entries.is_empty() => entries,
            _ => return ConsensusResult::empty(),
        };

        if entries.len() == 1 {
            let (reading, _) = &entries[0];
            return ConsensusResult {
                text: reading.corrected_text.clone(),
                confidence: reading.confidence,
                method: reading.method.clone(),
            };
        }

        // Groups keep first-seen order so ties go to the earliest text
        let mut groups: Vec<(&str, Vec<&OcrReading>)> = Vec::new();
        for (reading, _) in entries {
            match groups
                .iter_mut()
                .find(|(text, _)| *text == reading.corrected_text)
            {
                Some((_, members)) => members.push(reading),
                None => groups.push((reading.corrected_text.as_str(), vec![reading])),
            }
        }

        let total = entries.len() as f32;
        let mut best: Option<(f32, ConsensusResult)> = None;

        for (text, members) in groups {
            let n = members.len() as f32;
            let frequency = n / total;
            let mean_score = members.iter().map(|r| r.final_score).sum::<f32>() / n;
            let mean_confidence = members.iter().map(|r| r.confidence).sum::<f32>() / n;
            let consensus = frequency * 0.4 + mean_score * 0.6;

            if best.as_ref().map_or(true, |(score, _)| consensus > *score) {
                best = Some((
                    consensus,
                    ConsensusResult {
                        text: text.to_string(),
                        confidence: mean_confidence,
                        method: format!("consensus_{}frames_score{:.3}", members.len(), consensus),
                    },
                ));
            }
        }

        best.map(|(_, result)| result)
            .unwrap_or_else(ConsensusResult::empty)
    }

    /// Drop tracks whose newest reading is older than `max_age`
    pub fn evict_stale(&mut self, max_age: Duration) -> usize {
        self.evict_stale_at(max_age, Instant::now())
    }

    pub fn evict_stale_at(&mut self, max_age: Duration, now: Instant) -> usize {
        let before = self.history.len();
        self.history.retain(|_, entries| match entries.back() {
            Some((_, newest)) => now.saturating_duration_since(*newest) <= max_age,
            None => false,
        });
        before - self.history.len()
    }

    /// Forget a track immediately
    pub fn remove(&mut self, track_id: u64) {
        self.history.remove(&track_id);
    }

    pub fn tracked(&self) -> usize {
        self.history.len()
    }

    pub fn history_len(&self, track_id: u64) -> usize {
        self.history.get(&track_id).map_or(0, VecDeque::len)
    }
}
