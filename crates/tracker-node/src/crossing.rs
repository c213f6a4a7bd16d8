//! Per-track two-line crossing state machine.
//!
//! Every tracked object is projected onto the axis perpendicular to the
//! counting lines (centre x for vertical lines, centre y for horizontal
//! ones). A direction counts as crossed once the object has passed both
//! lines in that direction; the first full crossing of a track is reported
//! exactly once.

use common::detections::BoundingBox;
use common::events::Direction;
use common::site::{CameraConfig, LineOrientation};
use ocr_service::consensus::ConsensusResult;
use ocr_service::validator::KnownIdentifiers;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use tracing::debug;

/// Method tag of a track that never had a plate associated
pub const NO_LICENCE_METHOD: &str = "no_license";

/// Lifecycle of a tracked object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackPhase {
    /// Being followed, no full crossing yet
    Active,
    /// Both lines crossed, event not emitted yet
    CrossedPendingLog,
    /// Event emitted; further crossings are ignored
    Logged,
}

/// Which line was passed in which direction.
///
/// `forward` is rightward for vertical lines and downward for horizontal
/// lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrossingFlags {
    pub line1_forward: bool,
    pub line1_backward: bool,
    pub line2_forward: bool,
    pub line2_backward: bool,
}

impl CrossingFlags {
    pub fn forward(&self) -> bool {
        self.line1_forward && self.line2_forward
    }

    pub fn backward(&self) -> bool {
        self.line1_backward && self.line2_backward
    }
}

/// Best plate reading attached to a track
#[derive(Debug, Clone, PartialEq)]
pub struct TrackReading {
    pub text: String,
    pub confidence: f32,
    pub method: String,
    pub quality_score: f32,
    pub preprocessing_methods: Vec<String>,
    pub processing_time: f32,
    /// Text is one of the known commercial licences
    pub identified: bool,
}

impl TrackReading {
    /// Placeholder for tracks without an associated plate
    pub fn none() -> Self {
        Self {
            text: String::new(),
            confidence: 0.0,
            method: NO_LICENCE_METHOD.to_string(),
            quality_score: 0.0,
            preprocessing_methods: Vec::new(),
            processing_time: 0.0,
            identified: false,
        }
    }
}

/// One tracked object as seen in one frame
#[derive(Debug, Clone)]
pub struct Observation {
    pub track_id: u64,
    pub class_id: u32,
    pub class_name: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
    pub reading: TrackReading,
}

#[derive(Debug, Clone)]
pub struct TrackedObjectState {
    pub class_id: u32,
    pub class_name: String,
    /// Highest detector confidence seen
    pub confidence: f32,
    /// Last projected position
    pub position: f32,
    pub flags: CrossingFlags,
    pub reading: TrackReading,
    pub phase: TrackPhase,
    last_seen: Instant,
}

impl TrackedObjectState {
    pub fn is_logged(&self) -> bool {
        self.phase == TrackPhase::Logged
    }
}

pub struct CrossingTracker {
    orientation: LineOrientation,
    line1: f32,
    line2: f32,
    tracks: HashMap<u64, TrackedObjectState>,
    /// Logged tracks whose state was evicted; never reported again
    retired: HashSet<u64>,
}

impl CrossingTracker {
    pub fn new(orientation: LineOrientation, line1: i32, line2: i32) -> Self {
        Self {
            orientation,
            line1: line1 as f32,
            line2: line2 as f32,
            tracks: HashMap::new(),
            retired: HashSet::new(),
        }
    }

    pub fn for_camera(camera: &CameraConfig) -> Self {
        Self::new(camera.orientation, camera.line1, camera.line2)
    }

    /// Position of `bbox` along the counting axis
    pub fn project(&self, bbox: &BoundingBox) -> f32 {
        let (cx, cy) = bbox.center();
        match self.orientation {
            LineOrientation::Vertical => cx,
            LineOrientation::Horizontal => cy,
        }
    }

    pub fn direction_for(&self, forward: bool) -> Direction {
        match (self.orientation, forward) {
            (LineOrientation::Vertical, true) => Direction::Right,
            (LineOrientation::Vertical, false) => Direction::Left,
            (LineOrientation::Horizontal, true) => Direction::Down,
            (LineOrientation::Horizontal, false) => Direction::Up,
        }
    }

    pub fn observe(&mut self, observation: Observation) -> Option<Direction> {
        self.observe_at(observation, Instant::now())
    }

    /// Feed one observation.
    ///
    /// Returns the direction when this observation completes the track's
    /// first full crossing; the track is then `CrossedPendingLog` until
    /// [`CrossingTracker::complete`] is called.
    pub fn observe_at(&mut self, observation: Observation, now: Instant) -> Option<Direction> {
        let current = self.project(&observation.bbox);
        let (line1, line2) = (self.line1, self.line2);

        if self.retired.contains(&observation.track_id) {
            return None;
        }
        if !self.tracks.contains_key(&observation.track_id) {
            // First sighting: no previous position, nothing can be crossed yet
            self.tracks.insert(
                observation.track_id,
                TrackedObjectState {
                    class_id: observation.class_id,
                    class_name: observation.class_name,
                    confidence: observation.confidence,
                    position: current,
                    flags: CrossingFlags::default(),
                    reading: observation.reading,
                    phase: TrackPhase::Active,
                    last_seen: now,
                },
            );
            return None;
        }
        let state = self.tracks.get_mut(&observation.track_id)?;

        if observation.confidence > state.confidence {
            state.confidence = observation.confidence;
        }
        if observation.reading.confidence > state.reading.confidence {
            state.reading = observation.reading;
        }

        let previous = state.position;
        state.position = current;
        state.last_seen = now;

        let flags = &mut state.flags;
        if previous <= line1 && line1 < current {
            flags.line1_forward = true;
        }
        if previous >= line1 && line1 > current {
            flags.line1_backward = true;
        }
        if previous <= line2 && line2 < current {
            flags.line2_forward = true;
        }
        if previous >= line2 && line2 > current {
            flags.line2_backward = true;
        }

        if state.phase != TrackPhase::Active {
            return None;
        }
        let forward = if flags.forward() {
            true
        } else if flags.backward() {
            false
        } else {
            return None;
        };

        state.phase = TrackPhase::CrossedPendingLog;
        let direction = self.direction_for(forward);
        debug!(track_id = observation.track_id, direction = %direction, "track crossed both lines");
        Some(direction)
    }

    /// Finish a pending crossing and mark the track logged.
    ///
    /// A non-empty consensus result replaces the track's reading when its
    /// confidence is strictly higher.
    pub fn complete(
        &mut self,
        track_id: u64,
        consensus: &ConsensusResult,
        known: &KnownIdentifiers,
    ) -> Option<&TrackedObjectState> {
        let state = self.tracks.get_mut(&track_id)?;
        if state.phase != TrackPhase::CrossedPendingLog {
            return None;
        }

        if !consensus.text.is_empty() && consensus.confidence > state.reading.confidence {
            state.reading.text = consensus.text.clone();
            state.reading.confidence = consensus.confidence;
            state.reading.method = consensus.method.clone();
            state.reading.identified = known.contains(&consensus.text);
        }
        state.phase = TrackPhase::Logged;
        Some(state)
    }

    pub fn state(&self, track_id: u64) -> Option<&TrackedObjectState> {
        self.tracks.get(&track_id)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Forget tracks not observed for `max_age`; returns how many were dropped.
    ///
    /// Only the id of a logged track is kept, so a reappearing id cannot
    /// be reported a second time.
    pub fn evict_stale_at(&mut self, max_age: Duration, now: Instant) -> usize {
        let before = self.tracks.len();
        let retired = &mut self.retired;
        self.tracks.retain(|&track_id, state| {
            let fresh = now.saturating_duration_since(state.last_seen) <= max_age;
            if !fresh && state.is_logged() {
                retired.insert(track_id);
            }
            fresh
        });
        before - self.tracks.len()
    }
}
