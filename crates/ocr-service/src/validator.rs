//! OCR text validation and scoring.
//!
//! Every raw OCR string goes through the same pipeline:
//! 1. classify it as a license plate, a boat name or unknown
//! 2. apply the type's substitution table and strip disallowed characters
//! 3. validate the corrected text against the type's format rules
//! 4. snap it to a known identifier when the similarity is high enough
//! 5. combine everything into a final score in `[0, 1]`

use anyhow::{Context, Result};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use crate::similarity;

// ============================================================================
// Format tables
// ============================================================================

/// Plate formats, best match first
const PLATE_PATTERNS: &[&str] = &[
    r"^[A-Z]{1,3}-[A-Z]{1,2}\s?\d{1,4}$",
    r"^[A-Z]{1,3}-\d{1,4}\s{0,2}V?$",
    r"^\d{6}-[A-Z]$",
    r"^[A-Z]{3}\s\d{5}$",
    r"^[A-Z]{3}\s\d{3}-\d{3}$",
    r"^[A-Z]{2}\s[A-Z]\s\d{5}[A-Z]?$",
    r"^[A-Z]{2,4}\s?\d{2,6}[A-Z]?$",
];

/// Boat name formats, best match first
const NAME_PATTERNS: &[&str] = &[
    r"^[A-Z]{2,4}\s*\d{1,4}$",
    r"^[A-Z][a-z]+\s*\d*$",
    r"^[A-Z][a-z]+\s+[A-Z][a-z]+$",
    r"^[A-Z]{2,8}$",
    r"^\d{1,4}\s*[A-Z]{2,4}$",
    r"^[A-Z][a-z]+\s+[IV]+$",
];

const PLATE_CORRECTIONS: &[(&str, &str)] = &[
    ("0", "O"),
    ("|", "I"),
    ("1", "I"),
    ("5", "S"),
    ("8", "B"),
    ("6", "G"),
    ("9", "g"),
    ("cl", "d"),
    ("rn", "m"),
];

const NAME_CORRECTIONS: &[(&str, &str)] = &[
    ("0", "O"),
    ("|", "I"),
    ("1", "I"),
    ("5", "S"),
    ("8", "B"),
    ("rn", "m"),
    ("vv", "w"),
    ("VV", "W"),
    ("ii", "n"),
];

/// Words that frequently appear in German boat names
const BOAT_WORDS: &[&str] = &[
    "maria", "adler", "wind", "see", "stern", "nord", "süd", "ost", "west", "blau", "weiß",
    "rot", "gold", "silber", "freiheit", "hoffnung", "traum", "stolz", "mut",
];

const GERMAN_CHARS: &str = "äöüÄÖÜß";

/// Maximum length of a plausible identifier
const MAX_TEXT_LENGTH: usize = 25;

/// Similarity a known identifier needs to be considered at all
const SIMILARITY_CANDIDATE: f32 = 0.75;

/// Similarity a known identifier needs to replace the read text
const SIMILARITY_OVERRIDE: f32 = 0.8;

// ============================================================================
// Types
// ============================================================================

/// What kind of identifier a text looks like
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextType {
    LicensePlate,
    BoatName,
    Unknown,
}

impl fmt::Display for TextType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextType::LicensePlate => write!(f, "license_plate"),
            TextType::BoatName => write!(f, "boat_name"),
            TextType::Unknown => write!(f, "unknown"),
        }
    }
}

/// Why a validation ended the way it did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationReason {
    EmptyText,
    TooShort,
    TooLong,
    /// Unknown type accepted by one of the typed rule sets
    FallbackValidation,
    UnknownFormat,
}

/// Observations collected while validating a text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationDetails {
    pub original_length: usize,
    pub cleaned_length: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_pattern: Option<usize>,
    pub has_prefix: bool,
    pub has_numbers: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contains_boat_word: Option<String>,
    pub properly_capitalized: bool,
    pub reasonable_length: bool,
    pub contains_german_chars: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity_match: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<ValidationReason>,
}

/// Result of running one raw OCR string through the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrReading {
    /// Text exactly as the engine returned it
    pub text: String,
    /// Engine confidence
    pub confidence: f32,
    pub text_type: TextType,
    pub format_confidence: f32,
    /// Text after correction and known-identifier matching
    pub corrected_text: String,
    /// Method tag, e.g. `detailed_img2` or `consensus_3frames_score0.812`
    pub method: String,
    pub quality_score: f32,
    pub details: ValidationDetails,
    pub final_score: f32,
}

impl OcrReading {
    /// One-line human readable description for debug logs
    pub fn summary(&self) -> String {
        let mut parts = vec![
            format!("type: {}", self.text_type),
            format!("format confidence: {:.3}", self.format_confidence),
            format!("final score: {:.3}", self.final_score),
        ];
        if self.corrected_text != self.text {
            parts.push(format!(
                "corrected: '{}' -> '{}'",
                self.text, self.corrected_text
            ));
        }
        if let Some(similarity) = self.details.similarity_match {
            parts.push(format!("similarity match: {:.3}", similarity));
        }
        parts.join(" | ")
    }
}

/// Identifiers of known commercial boats, one per line in the source file
#[derive(Debug, Clone, Default)]
pub struct KnownIdentifiers {
    ordered: Vec<String>,
    lookup: HashSet<String>,
}

impl KnownIdentifiers {
    pub fn new<I, S>(identifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut known = Self::default();
        for id in identifiers {
            let id = id.into().trim().to_string();
            if !id.is_empty() && known.lookup.insert(id.clone()) {
                known.ordered.push(id);
            }
        }
        known
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read known identifiers {}", path.display()))?;
        Ok(Self::new(raw.lines()))
    }

    /// Exact membership test
    pub fn contains(&self, text: &str) -> bool {
        self.lookup.contains(text)
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ordered.iter().map(String::as_str)
    }
}

// ============================================================================
// Validator
// ============================================================================

/// Classifies, corrects, validates and scores OCR text
pub struct SmartValidator {
    known: KnownIdentifiers,
    plate_patterns: Vec<Regex>,
    name_patterns: Vec<Regex>,
    plate_prefix: Regex,
    digit_run: Regex,
    capitalized_word: Regex,
    digit_gap: Regex,
    letter_digit_gap: Regex,
    whitespace: Regex,
}

fn compile_all(patterns: &[&str]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            RegexBuilder::new(p)
                .case_insensitive(true)
                .build()
                .with_context(|| format!("invalid format pattern {}", p))
        })
        .collect()
}

impl SmartValidator {
    pub fn new(known: KnownIdentifiers) -> Result<Self> {
        Ok(Self {
            known,
            plate_patterns: compile_all(PLATE_PATTERNS)?,
            name_patterns: compile_all(NAME_PATTERNS)?,
            plate_prefix: Regex::new(r"^[A-Z]{1,3}-")?,
            digit_run: Regex::new(r"\d{3,6}")?,
            capitalized_word: Regex::new(r"^[A-Z][a-z]+")?,
            digit_gap: Regex::new(r"(\d)\s+(\w)")?,
            letter_digit_gap: Regex::new(r"([A-Z])\s+(\d)")?,
            whitespace: Regex::new(r"\s+")?,
        })
    }

    pub fn known(&self) -> &KnownIdentifiers {
        &self.known
    }

    /// Guess the text type and how sure the guess is
    pub fn classify(&self, text: &str) -> (TextType, f32) {
        let text = text.trim();
        if text.chars().count() < 2 {
            return (TextType::Unknown, 0.0);
        }

        let mut plate_score: f32 = 0.0;
        if self.plate_patterns.iter().any(|p| p.is_match(text)) {
            plate_score = 0.9;
        }
        if self.plate_prefix.is_match(text) {
            plate_score = plate_score.max(0.7);
        }
        if self.digit_run.is_match(text) && text.chars().count() <= 12 {
            plate_score = plate_score.max(0.6);
        }

        let mut name_score: f32 = 0.0;
        if self.name_patterns.iter().any(|p| p.is_match(text)) {
            name_score = 0.8;
        }
        if find_boat_word(text).is_some() {
            name_score = name_score.max(0.7);
        }
        if text.chars().count() > 8 && !self.plate_prefix.is_match(text) {
            name_score = name_score.max(0.6);
        }

        if plate_score > name_score && plate_score > 0.5 {
            (TextType::LicensePlate, plate_score)
        } else if name_score > 0.5 {
            (TextType::BoatName, name_score)
        } else {
            (TextType::Unknown, plate_score.max(name_score))
        }
    }

    /// Apply the type's OCR corrections and drop disallowed characters
    pub fn correct(&self, text: &str, text_type: TextType) -> String {
        if text.is_empty() {
            return String::new();
        }

        let mut corrected = text.to_string();
        match text_type {
            TextType::LicensePlate => {
                for (wrong, right) in PLATE_CORRECTIONS {
                    corrected = corrected.replace(wrong, right);
                }
                corrected = self
                    .digit_gap
                    .replace_all(&corrected, "${1}${2}")
                    .into_owned();
                corrected = self
                    .letter_digit_gap
                    .replace_all(&corrected, "${1} ${2}")
                    .into_owned();
            }
            TextType::BoatName => {
                for (wrong, right) in NAME_CORRECTIONS {
                    corrected = corrected.replace(wrong, right);
                }
                corrected = corrected
                    .split_whitespace()
                    .map(|word| {
                        if !is_numeric(word) && is_upper(word) && word.chars().count() > 3 {
                            capitalize(word)
                        } else {
                            word.to_string()
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(" ");
            }
            TextType::Unknown => {}
        }

        let cleaned: String = corrected
            .chars()
            .filter(|c| is_allowed(*c, text_type))
            .collect();
        if cleaned.chars().count() != corrected.chars().count() {
            tracing::trace!(raw = %corrected, cleaned = %cleaned, "removed disallowed characters");
        }

        self.whitespace.replace_all(&cleaned, " ").trim().to_string()
    }

    /// Check the corrected text against the format rules of its type
    pub fn validate(&self, text: &str, text_type: TextType) -> (bool, f32, ValidationDetails) {
        if text.is_empty() {
            return (
                false,
                0.0,
                ValidationDetails {
                    reason: Some(ValidationReason::EmptyText),
                    ..Default::default()
                },
            );
        }

        let clean = text.trim();
        let base = ValidationDetails {
            original_length: text.chars().count(),
            cleaned_length: clean.chars().count(),
            ..Default::default()
        };

        if base.cleaned_length < 2 {
            return (
                false,
                0.0,
                ValidationDetails {
                    reason: Some(ValidationReason::TooShort),
                    ..base
                },
            );
        }
        if base.cleaned_length > MAX_TEXT_LENGTH {
            return (
                false,
                0.2,
                ValidationDetails {
                    reason: Some(ValidationReason::TooLong),
                    ..base
                },
            );
        }

        match text_type {
            TextType::LicensePlate => self.validate_plate(clean, base),
            TextType::BoatName => self.validate_name(clean, base),
            TextType::Unknown => {
                let (plate_valid, plate_conf, _) =
                    self.validate_plate(clean, ValidationDetails::default());
                let (name_valid, name_conf, _) =
                    self.validate_name(clean, ValidationDetails::default());
                let best = plate_conf.max(name_conf);

                if plate_valid || name_valid {
                    (
                        true,
                        best,
                        ValidationDetails {
                            reason: Some(ValidationReason::FallbackValidation),
                            ..base
                        },
                    )
                } else {
                    (
                        false,
                        best * 0.5,
                        ValidationDetails {
                            reason: Some(ValidationReason::UnknownFormat),
                            ..base
                        },
                    )
                }
            }
        }
    }

    fn validate_plate(
        &self,
        text: &str,
        mut details: ValidationDetails,
    ) -> (bool, f32, ValidationDetails) {
        let mut confidence: f32 = 0.0;

        if let Some(rank) = self.plate_patterns.iter().position(|p| p.is_match(text)) {
            confidence = 0.9 - rank as f32 * 0.05;
            details.matched_pattern = Some(rank);
        }
        if self.plate_prefix.is_match(text) {
            confidence = confidence.max(0.7);
            details.has_prefix = true;
        }
        if self.digit_run.is_match(text) {
            confidence = confidence.max(0.6);
            details.has_numbers = true;
        }

        let len = text.chars().count();
        if (5..=12).contains(&len) {
            confidence += 0.1;
        }

        let starts_upper = text.chars().next().is_some_and(char::is_uppercase);
        if is_upper(text) || (starts_upper && text.chars().any(|c| c.is_ascii_digit())) {
            confidence += 0.1;
        }

        (confidence > 0.5, confidence, details)
    }

    fn validate_name(
        &self,
        text: &str,
        mut details: ValidationDetails,
    ) -> (bool, f32, ValidationDetails) {
        let mut confidence: f32 = 0.0;

        if let Some(rank) = self.name_patterns.iter().position(|p| p.is_match(text)) {
            confidence = 0.8 - rank as f32 * 0.05;
            details.matched_pattern = Some(rank);
        }
        if let Some(word) = find_boat_word(text) {
            confidence = confidence.max(0.7);
            details.contains_boat_word = Some(word.to_string());
        }
        if self.capitalized_word.is_match(text) {
            confidence += 0.1;
            details.properly_capitalized = true;
        }
        if text.chars().count() > 6 {
            confidence += 0.1;
            details.reasonable_length = true;
        }
        if text.chars().any(|c| GERMAN_CHARS.contains(c)) {
            confidence += 0.15;
            details.contains_german_chars = true;
        }

        (confidence > 0.4, confidence, details)
    }

    /// Closest known identifier and its similarity.
    ///
    /// Returns the input unchanged with similarity `0` when nothing is known
    /// or nothing is similar enough.
    pub fn match_known(&self, text: &str, text_type: TextType) -> (String, f32) {
        if text.is_empty() || self.known.is_empty() {
            return (text.to_string(), 0.0);
        }

        let mut best_match = text;
        let mut best_ratio: f32 = 0.0;

        for known in self.known.iter() {
            let ratio = match text_type {
                TextType::LicensePlate => {
                    let a = text.to_uppercase();
                    let b = known.to_uppercase();
                    let fuzzy = similarity::ratio(&a, &b);
                    similarity::positional_ratio(&a, &b).map_or(fuzzy, |p| fuzzy.max(p))
                }
                _ => similarity::ratio(&text.to_lowercase(), &known.to_lowercase()),
            };

            if ratio > best_ratio && ratio > SIMILARITY_CANDIDATE {
                best_ratio = ratio;
                best_match = known;
            }
        }

        (best_match.to_string(), best_ratio)
    }

    /// Combined score of a reading in `[0, 1]`
    pub fn score(&self, reading: &OcrReading) -> f32 {
        let too_short = matches!(
            reading.details.reason,
            Some(ValidationReason::EmptyText | ValidationReason::TooShort)
        );
        if too_short || reading.text.trim().chars().count() < 2 {
            return 0.0;
        }

        let format_weight = if reading.text_type == TextType::Unknown {
            0.15
        } else {
            0.3
        };
        let quality_factor = (reading.quality_score / 200.0).min(1.0);

        let mut score = reading.confidence * 0.3
            + reading.format_confidence * format_weight
            + quality_factor * 0.2;
        score *= length_factor(reading.text.chars().count(), reading.text_type);

        if reading.corrected_text != reading.text {
            score += 0.1;
        }

        score *= method_weight(&reading.method);

        if reading.details.matched_pattern.is_some() {
            score += 0.1;
        }
        if reading.details.contains_boat_word.is_some() {
            score += 0.15;
        }

        score.clamp(0.0, 1.0)
    }

    /// Run the full pipeline on one raw engine result
    pub fn process(&self, text: &str, confidence: f32, method: &str, quality: f32) -> OcrReading {
        let (text_type, _) = self.classify(text);
        let corrected = self.correct(text, text_type);
        let (_, mut format_confidence, mut details) = self.validate(&corrected, text_type);

        let (matched, similarity) = self.match_known(&corrected, text_type);
        let corrected_text = if similarity > SIMILARITY_OVERRIDE {
            format_confidence = format_confidence.max(similarity);
            details.similarity_match = Some(similarity);
            matched
        } else {
            corrected
        };

        let mut reading = OcrReading {
            text: text.to_string(),
            confidence,
            text_type,
            format_confidence,
            corrected_text,
            method: method.to_string(),
            quality_score: quality,
            details,
            final_score: 0.0,
        };
        reading.final_score = self.score(&reading);
        reading
    }
}

fn length_factor(len: usize, text_type: TextType) -> f32 {
    match text_type {
        TextType::LicensePlate => match len {
            6..=12 => 1.0,
            4..=15 => 0.9,
            _ => 0.7,
        },
        TextType::BoatName => match len {
            4..=20 => 1.0,
            2..=25 => 0.8,
            _ => 0.6,
        },
        TextType::Unknown => match len {
            3..=15 => 0.8,
            _ => 0.6,
        },
    }
}

/// Weight of an OCR method, keyed by the tag prefix before the first `_`
fn method_weight(method: &str) -> f32 {
    match method.split('_').next().unwrap_or_default() {
        "standard" => 1.0,
        "detailed" => 1.1,
        "paragraph" => 0.9,
        "enhanced" => 1.2,
        "consensus" => 1.3,
        _ => 1.0,
    }
}

fn find_boat_word(text: &str) -> Option<&'static str> {
    let lower = text.to_lowercase();
    BOAT_WORDS.iter().copied().find(|w| lower.contains(w))
}

fn is_allowed(c: char, text_type: TextType) -> bool {
    if c.is_ascii_alphanumeric() {
        return true;
    }
    match text_type {
        TextType::LicensePlate => c == '-' || c == ' ',
        TextType::BoatName => c == '-' || c == ' ' || GERMAN_CHARS.contains(c),
        TextType::Unknown => false,
    }
}

/// At least one cased character and no lowercase ones
fn is_upper(text: &str) -> bool {
    let mut cased = false;
    for c in text.chars() {
        if c.is_lowercase() {
            return false;
        }
        if c.is_uppercase() {
            cased = true;
        }
    }
    cased
}

fn is_numeric(text: &str) -> bool {
    !text.is_empty() && text.chars().all(char::is_numeric)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> SmartValidator {
        SmartValidator::new(KnownIdentifiers::default()).unwrap()
    }

    fn validator_with(known: &[&str]) -> SmartValidator {
        SmartValidator::new(KnownIdentifiers::new(known.iter().copied())).unwrap()
    }

    #[test]
    fn test_classify_plates_and_names() {
        let v = validator();

        let (kind, conf) = v.classify("AB-A 170");
        assert_eq!(kind, TextType::LicensePlate);
        assert!((conf - 0.9).abs() < 1e-6);

        let (kind, conf) = v.classify("Seeadler");
        assert_eq!(kind, TextType::BoatName);
        assert!((conf - 0.8).abs() < 1e-6);

        // "BSR 24138" matches plate and name patterns; plate wins on score
        assert_eq!(v.classify("BSR 24138").0, TextType::LicensePlate);

        assert_eq!(v.classify("x"), (TextType::Unknown, 0.0));
        assert_eq!(v.classify("  "), (TextType::Unknown, 0.0));
    }

    #[test]
    fn test_classify_falls_back_to_unknown() {
        let v = validator();
        let (kind, conf) = v.classify("?!");
        assert_eq!(kind, TextType::Unknown);
        assert_eq!(conf, 0.0);
    }

    #[test]
    fn test_plate_correction_substitutes_and_closes_gaps() {
        let v = validator();
        assert_eq!(v.correct("AB-1 70", TextType::LicensePlate), "AB-I 7O");
        assert_eq!(v.correct("B5R  24", TextType::LicensePlate), "BSR 24");
        assert_eq!(v.correct("AB#-12!3", TextType::LicensePlate), "AB-I23");
    }

    #[test]
    fn test_name_correction_capitalizes_shouting_words() {
        let v = validator();
        assert_eq!(v.correct("NORDWIND", TextType::BoatName), "Nordwind");
        assert_eq!(v.correct("MS 0ST", TextType::BoatName), "MS OST");
        assert_eq!(v.correct("Möwe  *ii*", TextType::BoatName), "Möwe n");
    }

    #[test]
    fn test_unknown_correction_keeps_only_letters_and_digits() {
        let v = validator();
        assert_eq!(v.correct("a b-c ä", TextType::Unknown), "abc");
        assert_eq!(v.correct("", TextType::Unknown), "");
    }

    #[test]
    fn test_validate_plate_rank_and_bonuses() {
        let v = validator();
        let (valid, conf, details) = v.validate("AB-A 170", TextType::LicensePlate);
        assert!(valid);
        // rank 0 (0.9) + length bonus + uppercase bonus
        assert!((conf - 1.1).abs() < 1e-5);
        assert_eq!(details.matched_pattern, Some(0));
        assert!(details.has_prefix);
        assert!(details.has_numbers);

        let (valid, conf, details) = v.validate("HST 433-100", TextType::LicensePlate);
        assert!(valid);
        assert!((conf - (0.9 - 4.0 * 0.05 + 0.2)).abs() < 1e-5);
        assert_eq!(details.matched_pattern, Some(4));
    }

    #[test]
    fn test_validate_rejects_length_extremes() {
        let v = validator();
        let (valid, conf, details) = v.validate("", TextType::LicensePlate);
        assert!(!valid);
        assert_eq!(conf, 0.0);
        assert_eq!(details.reason, Some(ValidationReason::EmptyText));

        let (valid, conf, details) = v.validate(" A ", TextType::BoatName);
        assert!(!valid);
        assert_eq!(conf, 0.0);
        assert_eq!(details.reason, Some(ValidationReason::TooShort));

        let long = "A".repeat(26);
        let (valid, conf, details) = v.validate(&long, TextType::BoatName);
        assert!(!valid);
        assert!((conf - 0.2).abs() < 1e-6);
        assert_eq!(details.reason, Some(ValidationReason::TooLong));
    }

    #[test]
    fn test_validate_name_with_umlauts() {
        let v = validator();
        let (valid, conf, details) = v.validate("Seemöwe", TextType::BoatName);
        assert!(valid);
        // boat word + capitalised + long + umlaut, no pattern ("ö" is not in [a-z])
        assert!((conf - 1.05).abs() < 1e-5);
        assert_eq!(details.contains_boat_word.as_deref(), Some("see"));
        assert!(details.contains_german_chars);
        assert!(details.properly_capitalized);
        assert_eq!(details.matched_pattern, None);

        let (valid, _, _) = v.validate("Möwenflug", TextType::BoatName);
        assert!(!valid);
    }

    #[test]
    fn test_validate_unknown_uses_fallback() {
        let v = validator();
        let (valid, _, details) = v.validate("AB123", TextType::Unknown);
        assert!(valid);
        assert_eq!(details.reason, Some(ValidationReason::FallbackValidation));
        assert_eq!(details.matched_pattern, None);

        let (valid, conf, details) = v.validate("--", TextType::Unknown);
        assert!(!valid);
        assert_eq!(details.reason, Some(ValidationReason::UnknownFormat));
        assert!(conf < 0.5);
    }

    #[test]
    fn test_match_known_thresholds() {
        let v = validator_with(&["AB-1234", "HST 433-100"]);

        let (text, ratio) = v.match_known("AB-1284", TextType::LicensePlate);
        assert_eq!(text, "AB-1234");
        assert!(ratio > 0.8);

        let (text, ratio) = v.match_known("ZZ-9", TextType::LicensePlate);
        assert_eq!(text, "ZZ-9");
        assert_eq!(ratio, 0.0);

        let empty = validator();
        assert_eq!(
            empty.match_known("AB-1284", TextType::LicensePlate),
            ("AB-1284".to_string(), 0.0)
        );
    }

    #[test]
    fn test_process_snaps_to_known_identifier() {
        let v = validator_with(&["ABC 2347"]);
        let reading = v.process("ABC 2374", 0.6, "detailed_img0", 150.0);
        assert_eq!(reading.text_type, TextType::LicensePlate);
        assert_eq!(reading.corrected_text, "ABC 2347");
        assert!(reading.details.similarity_match.is_some());
        assert!(reading.format_confidence >= reading.details.similarity_match.unwrap());
    }

    #[test]
    fn test_score_is_zero_for_empty_text() {
        let v = validator();
        let reading = v.process("", 0.9, "standard_img0", 200.0);
        assert_eq!(reading.final_score, 0.0);
        assert_eq!(reading.text_type, TextType::Unknown);
    }

    #[test]
    fn test_score_is_zero_for_single_character() {
        let v = validator();
        for text in ["A", " 7 "] {
            let reading = v.process(text, 0.9, "standard_img0", 200.0);
            assert_eq!(reading.final_score, 0.0, "{:?} scored", text);
            assert_eq!(reading.text_type, TextType::Unknown);
        }
        assert!(v.process("AB", 0.9, "standard_img0", 200.0).final_score > 0.0);
    }

    #[test]
    fn test_score_is_monotonic_in_confidence() {
        let v = validator();
        let mut previous = -1.0;
        for step in 0..=10 {
            let conf = step as f32 / 10.0;
            let score = v.process("Nordwind", conf, "standard_img0", 120.0).final_score;
            assert!(score >= previous, "score dropped at confidence {}", conf);
            previous = score;
        }
    }

    #[test]
    fn test_score_is_clamped_and_weighted_by_method() {
        let v = validator();
        let plain = v.process("AB-A 170", 0.2, "paragraph_img1", 50.0).final_score;
        let enhanced = v.process("AB-A 170", 0.2, "enhanced_img1", 50.0).final_score;
        assert!(enhanced > plain);

        let best = v.process("AB-A 170", 1.0, "consensus_5frames_score0.900", 400.0);
        assert!(best.final_score <= 1.0);
    }

    #[test]
    fn test_known_identifiers_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("known.txt");
        std::fs::write(&path, "AB-1234\n\n  HST 433-100 \nAB-1234\n").unwrap();

        let known = KnownIdentifiers::from_path(&path).unwrap();
        assert_eq!(known.len(), 2);
        assert!(known.contains("HST 433-100"));
        assert!(!known.contains("AB-123"));
    }
}
