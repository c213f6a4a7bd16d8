//! Merging a primary event with its exit event into one record.

use common::events::{CompletedRecord, PairingStatus, RawEvent, EXIT_TIMEOUT};

/// The event whose OCR reading goes into the record.
///
/// A non-empty text beats an empty one. Two empty texts go by OCR
/// confidence; two non-empty texts by length, then confidence. Ties keep
/// `primary`.
pub fn choose_best_text<'a>(primary: &'a RawEvent, secondary: &'a RawEvent) -> &'a RawEvent {
    match (primary.has_text(), secondary.has_text()) {
        (true, false) => primary,
        (false, true) => secondary,
        (false, false) => by_confidence(primary, secondary),
        (true, true) => {
            let a = primary.extracted_text.chars().count();
            let b = secondary.extracted_text.chars().count();
            if a > b {
                primary
            } else if b > a {
                secondary
            } else {
                by_confidence(primary, secondary)
            }
        }
    }
}

fn by_confidence<'a>(primary: &'a RawEvent, secondary: &'a RawEvent) -> &'a RawEvent {
    if primary.ocr_confidence >= secondary.ocr_confidence {
        primary
    } else {
        secondary
    }
}

/// Record for `primary`, paired with `exit` when one matched
pub fn build_record(primary: &RawEvent, exit: Option<&RawEvent>, location: &str) -> CompletedRecord {
    let (best, confidence, exit_timestamp, pairing_status) = match exit {
        Some(exit) => (
            choose_best_text(primary, exit),
            primary.confidence.max(exit.confidence),
            exit.timestamp.clone(),
            PairingStatus::PairedWith(exit.camera),
        ),
        None => (
            primary,
            primary.confidence,
            EXIT_TIMEOUT.to_string(),
            PairingStatus::TimeoutNoExitMatch,
        ),
    };

    CompletedRecord {
        track_id: primary.track_id,
        class_id: primary.class_id,
        class_name: primary.class_name.clone(),
        direction: primary.direction,
        entry_timestamp: primary.timestamp.clone(),
        exit_timestamp,
        location: location.to_string(),
        extracted_text: best.extracted_text.clone(),
        identified_licence_number: best.identified_licence_number,
        ocr_confidence: best.ocr_confidence,
        confidence,
        pairing_status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::events::{Direction, LicenceMatch};

    fn event(camera: u32, text: &str, ocr_confidence: f32) -> RawEvent {
        RawEvent {
            camera,
            track_id: 11,
            class_id: 1,
            class_name: "motorboat".to_string(),
            direction: Direction::Right,
            timestamp: "2025-06-01 10:00:00".to_string(),
            location: "Diemitz".to_string(),
            extracted_text: text.to_string(),
            identified_licence_number: LicenceMatch::No,
            ocr_confidence,
            confidence: 0.5,
            ocr_method_used: "standard_img0".to_string(),
            ocr_processing_time: 0.0,
            frame_quality_score: 150.0,
            preprocessing_methods: Vec::new(),
        }
    }

    #[test]
    fn test_non_empty_text_beats_confidence() {
        let a = event(2, "", 0.9);
        let b = event(1, "AB-123", 0.2);
        assert_eq!(choose_best_text(&a, &b).extracted_text, "AB-123");
        assert_eq!(choose_best_text(&b, &a).extracted_text, "AB-123");
    }

    #[test]
    fn test_longer_text_beats_confidence() {
        let a = event(2, "AB1", 0.9);
        let b = event(1, "AB123", 0.1);
        assert_eq!(choose_best_text(&a, &b).extracted_text, "AB123");
    }

    #[test]
    fn test_ties_keep_primary() {
        let a = event(2, "", 0.4);
        let b = event(1, "", 0.4);
        assert_eq!(choose_best_text(&a, &b).camera, 2);

        let a = event(2, "AB-12", 0.4);
        let b = event(1, "AB-13", 0.4);
        assert_eq!(choose_best_text(&a, &b).camera, 2);

        let b = event(1, "AB-13", 0.6);
        assert_eq!(choose_best_text(&a, &b).camera, 1);

        let a = event(2, "", 0.1);
        let b = event(1, "", 0.3);
        assert_eq!(choose_best_text(&a, &b).camera, 1);
    }

    #[test]
    fn test_paired_record() {
        let mut primary = event(2, "AB-123", 0.7);
        primary.identified_licence_number = LicenceMatch::Yes;
        let mut exit = event(1, "", 0.0);
        exit.timestamp = "2025-06-01 10:03:00".to_string();
        exit.confidence = 0.9;

        let record = build_record(&primary, Some(&exit), "Diemitz");
        assert_eq!(record.pairing_status, PairingStatus::PairedWith(1));
        assert_eq!(record.extracted_text, "AB-123");
        assert_eq!(record.identified_licence_number, LicenceMatch::Yes);
        assert_eq!(record.exit_timestamp, "2025-06-01 10:03:00");
        assert_eq!(record.confidence, 0.9);
        assert_eq!(record.entry_timestamp, "2025-06-01 10:00:00");
    }

    #[test]
    fn test_timeout_record() {
        let primary = event(2, "", 0.0);
        let record = build_record(&primary, None, "Diemitz");
        assert_eq!(record.pairing_status, PairingStatus::TimeoutNoExitMatch);
        assert_eq!(record.exit_timestamp, "timeout");
        assert_eq!(record.confidence, 0.5);
        assert!(!record.is_paired());
    }
}
