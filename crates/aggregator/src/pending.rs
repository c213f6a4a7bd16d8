//! Primary-camera events waiting for their exit event.

use chrono::NaiveDateTime;
use common::events::{Direction, RawEvent};
use common::validation::{parse_timestamp, time_bucket_label};
use std::fmt;
use std::time::Duration;

/// Matching key of a pending entry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PendingKey {
    pub class_id: u32,
    pub direction: Direction,
    /// Entry time rounded down to the bucket, or the raw timestamp
    pub bucket: String,
}

impl PendingKey {
    pub fn for_event(event: &RawEvent, bucket: Duration) -> Self {
        Self {
            class_id: event.class_id,
            direction: event.direction,
            bucket: time_bucket_label(&event.timestamp, bucket.as_secs() as i64),
        }
    }
}

impl fmt::Display for PendingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.class_id, self.direction, self.bucket)
    }
}

/// What happened when a primary event was stored
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    /// New key
    Inserted,
    /// Same key already pending; the older event was overwritten in place
    Replaced(RawEvent),
    /// Table was full; the oldest entry was taken out to make room
    Evicted(RawEvent),
}

/// Insertion-ordered table of pending primary events, one per key
#[derive(Debug)]
pub struct PendingTable {
    entries: Vec<(PendingKey, RawEvent)>,
    capacity: usize,
    bucket: Duration,
}

impl PendingTable {
    pub fn new(capacity: usize, bucket: Duration) -> Self {
        Self {
            entries: Vec::new(),
            capacity: capacity.max(1),
            bucket,
        }
    }

    pub fn insert(&mut self, event: RawEvent) -> InsertOutcome {
        let key = PendingKey::for_event(&event, self.bucket);

        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            let previous = std::mem::replace(&mut slot.1, event);
            return InsertOutcome::Replaced(previous);
        }

        let evicted = (self.entries.len() >= self.capacity).then(|| self.entries.remove(0).1);
        self.entries.push((key, event));
        match evicted {
            Some(oldest) => InsertOutcome::Evicted(oldest),
            None => InsertOutcome::Inserted,
        }
    }

    /// Remove and return the first entry `exit` can close.
    ///
    /// Class and direction must be equal and the entry times must differ by
    /// strictly less than `window`. Entries are scanned in insertion order.
    pub fn take_match(&mut self, exit: &RawEvent, window: Duration) -> Option<(PendingKey, RawEvent)> {
        let exit_time = parse_timestamp(&exit.timestamp).ok()?;
        let index = self.entries.iter().position(|(key, pending)| {
            key.class_id == exit.class_id
                && key.direction == exit.direction
                && parse_timestamp(&pending.timestamp)
                    .map(|t| abs_diff(t, exit_time) < window)
                    .unwrap_or(false)
        })?;
        Some(self.entries.remove(index))
    }

    /// Remove entries with `now - T >= window` or an unparseable `T`
    pub fn take_expired(&mut self, now: NaiveDateTime, window: Duration) -> Vec<(PendingKey, RawEvent)> {
        let mut expired = Vec::new();
        let mut kept = Vec::with_capacity(self.entries.len());
        for (key, event) in self.entries.drain(..) {
            let is_expired = match parse_timestamp(&event.timestamp) {
                Ok(t) => (now - t)
                    .to_std()
                    .map(|elapsed| elapsed >= window)
                    .unwrap_or(false),
                Err(_) => true,
            };
            if is_expired {
                expired.push((key, event));
            } else {
                kept.push((key, event));
            }
        }
        self.entries = kept;
        expired
    }

    /// Remove everything, oldest first
    pub fn drain(&mut self) -> Vec<(PendingKey, RawEvent)> {
        std::mem::take(&mut self.entries)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &PendingKey> {
        self.entries.iter().map(|(k, _)| k)
    }
}

fn abs_diff(a: NaiveDateTime, b: NaiveDateTime) -> Duration {
    (a - b).abs().to_std().unwrap_or(Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::events::LicenceMatch;

    const BUCKET: Duration = Duration::from_secs(300);
    const WINDOW: Duration = Duration::from_secs(20 * 60);

    fn event(camera: u32, class_id: u32, direction: Direction, timestamp: &str) -> RawEvent {
        RawEvent {
            camera,
            track_id: 1,
            class_id,
            class_name: "boat".to_string(),
            direction,
            timestamp: timestamp.to_string(),
            location: "Diemitz".to_string(),
            extracted_text: String::new(),
            identified_licence_number: LicenceMatch::No,
            ocr_confidence: 0.0,
            confidence: 0.5,
            ocr_method_used: "no_license".to_string(),
            ocr_processing_time: 0.0,
            frame_quality_score: 0.0,
            preprocessing_methods: Vec::new(),
        }
    }

    fn ts(value: &str) -> NaiveDateTime {
        parse_timestamp(value).unwrap()
    }

    #[test]
    fn test_same_bucket_overwrites_in_place() {
        let mut table = PendingTable::new(16, BUCKET);
        assert_eq!(table.insert(event(2, 1, Direction::Right, "2025-06-01 10:01:00")), InsertOutcome::Inserted);
        table.insert(event(2, 2, Direction::Right, "2025-06-01 10:02:00"));

        let outcome = table.insert(event(2, 1, Direction::Right, "2025-06-01 10:04:59"));
        assert!(matches!(outcome, InsertOutcome::Replaced(ref old) if old.timestamp == "2025-06-01 10:01:00"));
        assert_eq!(table.len(), 2);
        assert_eq!(table.keys().next().unwrap().class_id, 1);

        // Next bucket is a new key
        assert_eq!(table.insert(event(2, 1, Direction::Right, "2025-06-01 10:05:00")), InsertOutcome::Inserted);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_full_table_evicts_oldest() {
        let mut table = PendingTable::new(2, BUCKET);
        table.insert(event(2, 1, Direction::Right, "2025-06-01 10:00:00"));
        table.insert(event(2, 2, Direction::Right, "2025-06-01 10:00:00"));

        let outcome = table.insert(event(2, 3, Direction::Right, "2025-06-01 10:00:00"));
        assert!(matches!(outcome, InsertOutcome::Evicted(ref old) if old.class_id == 1));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_first_match_in_insertion_order() {
        let mut table = PendingTable::new(16, BUCKET);
        table.insert(event(2, 1, Direction::Right, "2025-06-01 10:00:00"));
        table.insert(event(2, 1, Direction::Right, "2025-06-01 10:06:00"));
        table.insert(event(2, 1, Direction::Left, "2025-06-01 10:07:00"));

        let exit = event(1, 1, Direction::Right, "2025-06-01 10:08:00");
        let (_, matched) = table.take_match(&exit, WINDOW).unwrap();
        assert_eq!(matched.timestamp, "2025-06-01 10:00:00");
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_match_window_is_exclusive() {
        let mut table = PendingTable::new(16, BUCKET);
        table.insert(event(2, 1, Direction::Right, "2025-06-01 10:00:00"));

        let too_late = event(1, 1, Direction::Right, "2025-06-01 10:20:00");
        assert!(table.take_match(&too_late, WINDOW).is_none());

        let in_time = event(3, 1, Direction::Right, "2025-06-01 10:19:59");
        assert!(table.take_match(&in_time, WINDOW).is_some());

        table.insert(event(2, 1, Direction::Right, "2025-06-01 10:00:00"));
        let wrong_class = event(1, 4, Direction::Right, "2025-06-01 10:01:00");
        assert!(table.take_match(&wrong_class, WINDOW).is_none());
        let garbage = event(1, 1, Direction::Right, "soon");
        assert!(table.take_match(&garbage, WINDOW).is_none());
    }

    #[test]
    fn test_expiry_boundary() {
        let mut table = PendingTable::new(16, BUCKET);
        table.insert(event(2, 1, Direction::Right, "2025-06-01 10:00:00"));

        assert!(table.take_expired(ts("2025-06-01 10:19:59"), WINDOW).is_empty());
        assert_eq!(table.len(), 1);
        assert_eq!(table.take_expired(ts("2025-06-01 10:20:00"), WINDOW).len(), 1);
        assert!(table.is_empty());
    }

    #[test]
    fn test_unparseable_timestamps_expire_immediately() {
        let mut table = PendingTable::new(16, BUCKET);
        table.insert(event(2, 1, Direction::Right, "garbage"));
        table.insert(event(2, 1, Direction::Right, "2025-06-01 10:00:00"));

        let expired = table.take_expired(ts("2025-06-01 10:00:01"), WINDOW);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].0.bucket, "garbage");
        assert_eq!(table.len(), 1);
    }
}
