//! Event contracts between the camera pipelines and the aggregator.
//!
//! A [`RawEvent`] is emitted once per confirmed line crossing by a camera
//! pipeline. The aggregator turns every primary-camera event into exactly one
//! [`CompletedRecord`], either paired with a secondary-camera event or timed
//! out.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Value written to `exit_timestamp` when no exit camera matched
pub const EXIT_TIMEOUT: &str = "timeout";

/// Travel direction of a completed crossing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Right,
    Left,
    Down,
    Up,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Direction::Right => "right",
            Direction::Left => "left",
            Direction::Down => "down",
            Direction::Up => "up",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "right" => Ok(Direction::Right),
            "left" => Ok(Direction::Left),
            "down" => Ok(Direction::Down),
            "up" => Ok(Direction::Up),
            _ => Err(format!("Invalid direction: {}", s)),
        }
    }
}

/// Whether the extracted text is one of the known commercial licences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LicenceMatch {
    Yes,
    #[default]
    No,
}

impl LicenceMatch {
    pub fn from_bool(known: bool) -> Self {
        if known {
            Self::Yes
        } else {
            Self::No
        }
    }
}

impl fmt::Display for LicenceMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LicenceMatch::Yes => write!(f, "yes"),
            LicenceMatch::No => write!(f, "no"),
        }
    }
}

/// Crossing event emitted by a camera pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Camera number (1-based, as configured)
    pub camera: u32,

    pub track_id: u64,

    pub class_id: u32,

    pub class_name: String,

    pub direction: Direction,

    /// Local time of the crossing, `YYYY-MM-DD HH:MM:SS`
    pub timestamp: String,

    pub location: String,

    /// Best OCR text for the object, empty when nothing was read
    pub extracted_text: String,

    pub identified_licence_number: LicenceMatch,

    pub ocr_confidence: f32,

    /// Highest detector confidence seen for the track
    pub confidence: f32,

    pub ocr_method_used: String,

    pub ocr_processing_time: f32,

    pub frame_quality_score: f32,

    pub preprocessing_methods: Vec<String>,
}

impl RawEvent {
    pub fn has_text(&self) -> bool {
        !self.extracted_text.is_empty()
    }
}

/// Outcome tag of a completed record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingStatus {
    /// Matched by an exit event from the given camera
    PairedWith(u32),
    /// No exit event arrived within the timeout window
    TimeoutNoExitMatch,
}

impl fmt::Display for PairingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PairingStatus::PairedWith(camera) => write!(f, "paired_with_cam{}", camera),
            PairingStatus::TimeoutNoExitMatch => write!(f, "timeout_no_exit_match"),
        }
    }
}

impl FromStr for PairingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "timeout_no_exit_match" {
            return Ok(PairingStatus::TimeoutNoExitMatch);
        }
        s.strip_prefix("paired_with_cam")
            .and_then(|n| n.parse().ok())
            .map(PairingStatus::PairedWith)
            .ok_or_else(|| format!("Invalid pairing status: {}", s))
    }
}

impl Serialize for PairingStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PairingStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One durable output row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedRecord {
    pub track_id: u64,
    pub class_id: u32,
    pub class_name: String,
    pub direction: Direction,
    pub entry_timestamp: String,
    /// Exit camera timestamp, or [`EXIT_TIMEOUT`]
    pub exit_timestamp: String,
    pub location: String,
    pub extracted_text: String,
    pub identified_licence_number: LicenceMatch,
    pub ocr_confidence: f32,
    pub confidence: f32,
    pub pairing_status: PairingStatus,
}

impl CompletedRecord {
    pub fn is_paired(&self) -> bool {
        matches!(self.pairing_status, PairingStatus::PairedWith(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pairing_status_round_trips_through_text() {
        assert_eq!(PairingStatus::PairedWith(3).to_string(), "paired_with_cam3");
        assert_eq!(
            "paired_with_cam1".parse::<PairingStatus>(),
            Ok(PairingStatus::PairedWith(1))
        );
        assert_eq!(
            "timeout_no_exit_match".parse::<PairingStatus>(),
            Ok(PairingStatus::TimeoutNoExitMatch)
        );
        assert!("paired_with_camX".parse::<PairingStatus>().is_err());
    }

    #[test]
    fn test_direction_parsing_is_case_insensitive() {
        assert_eq!("Right".parse::<Direction>(), Ok(Direction::Right));
        assert_eq!("up".parse::<Direction>(), Ok(Direction::Up));
        assert!("sideways".parse::<Direction>().is_err());
    }

    #[test]
    fn test_record_serializes_status_as_string() {
        let record = CompletedRecord {
            track_id: 7,
            class_id: 1,
            class_name: "sailboat_with_cabin".to_string(),
            direction: Direction::Left,
            entry_timestamp: "2025-01-01 10:00:00".to_string(),
            exit_timestamp: EXIT_TIMEOUT.to_string(),
            location: "Diemitz".to_string(),
            extracted_text: String::new(),
            identified_licence_number: LicenceMatch::No,
            ocr_confidence: 0.0,
            confidence: 0.9,
            pairing_status: PairingStatus::TimeoutNoExitMatch,
        };

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["pairing_status"], "timeout_no_exit_match");
        assert_eq!(value["direction"], "left");
        assert_eq!(value["identified_licence_number"], "no");
        assert!(!record.is_paired());
    }
}
