//! Camera worker: one per configured camera.
//!
//! Pulls frames from a [`DetectionSource`], reads plates, associates them with
//! boats, feeds the consensus and crossing trackers and sends a [`RawEvent`]
//! to the aggregator for every logged crossing. The loop is synchronous and
//! runs on the blocking pool.

use chrono::{NaiveDateTime, Timelike};
use common::detections::{Detection, TrackedFrame};
use common::events::{Direction, LicenceMatch, RawEvent};
use common::site::CameraConfig;
use common::validation::format_timestamp;
use ocr_service::config::OcrConfig;
use ocr_service::consensus::ConsensusTracker;
use ocr_service::plate_reader::{best_plate_for_boat, PlateObservation, PlateReader};
use std::sync::Arc;
use std::time::Instant;
use telemetry::metrics::{
    CAMERA_ACTIVE_TRACKS, CAMERA_CROSSINGS, CAMERA_FRAMES_PROCESSED, CAMERA_SNAPSHOTS_SAVED,
    CAMERA_SOURCE_ERRORS, OCR_CONSENSUS_TRACKS,
};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::TrackerConfig;
use crate::crossing::{CrossingTracker, Observation, TrackReading};
use crate::snapshots::{event_id, EventSnapshotWriter, FrameSnapshot, LabelledBox, SnapshotBoard};
use crate::source::DetectionSource;

pub struct CameraWorker {
    camera: CameraConfig,
    camera_label: String,
    location: String,
    /// Names kept verbatim in file names
    preserved_names: Vec<String>,
    reader: Arc<PlateReader>,
    consensus: ConsensusTracker,
    crossings: CrossingTracker,
    board: SnapshotBoard,
    snapshots: Option<EventSnapshotWriter>,
    events: UnboundedSender<RawEvent>,
    tracker_config: TrackerConfig,
    ocr_config: OcrConfig,
    last_eviction: Instant,
}

impl CameraWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        camera: CameraConfig,
        location: impl Into<String>,
        preserved_names: Vec<String>,
        reader: Arc<PlateReader>,
        board: SnapshotBoard,
        events: UnboundedSender<RawEvent>,
        tracker_config: TrackerConfig,
        ocr_config: OcrConfig,
    ) -> Self {
        let location = location.into();
        let snapshots = tracker_config
            .save_snapshots
            .then(|| EventSnapshotWriter::new(&tracker_config.output_root, &location));
        let consensus = ConsensusTracker::new(reader.validator().clone(), ocr_config.history_capacity);

        Self {
            camera_label: camera.id.to_string(),
            crossings: CrossingTracker::for_camera(&camera),
            camera,
            location,
            preserved_names,
            reader,
            consensus,
            board,
            snapshots,
            events,
            tracker_config,
            ocr_config,
            last_eviction: Instant::now(),
        }
    }

    pub fn camera_id(&self) -> u32 {
        self.camera.id
    }

    /// Run the loop on the blocking pool
    pub fn spawn(self, source: Box<dyn DetectionSource>, token: CancellationToken) -> JoinHandle<usize> {
        tokio::task::spawn_blocking(move || self.run(source, token))
    }

    /// Process frames until the source ends or `token` is cancelled.
    ///
    /// Returns the number of events emitted.
    pub fn run(mut self, mut source: Box<dyn DetectionSource>, token: CancellationToken) -> usize {
        info!(
            camera = self.camera.id,
            location = %self.location,
            orientation = %self.camera.orientation,
            line1 = self.camera.line1,
            line2 = self.camera.line2,
            "camera worker started"
        );

        let mut emitted = 0;
        let mut frames = 0u64;
        loop {
            if token.is_cancelled() {
                info!(camera = self.camera.id, "camera worker cancelled");
                break;
            }

            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    info!(camera = self.camera.id, "detection source ended");
                    break;
                }
                Err(e) => {
                    CAMERA_SOURCE_ERRORS.with_label_values(&[&self.camera_label]).inc();
                    warn!(camera = self.camera.id, error = %e, "failed to read frame");
                    continue;
                }
            };

            frames += 1;
            match self.process_frame(frame) {
                Ok(count) => emitted += count,
                Err(e) => {
                    error!(camera = self.camera.id, error = %e, "event queue closed, stopping camera worker");
                    break;
                }
            }
            self.maybe_evict();
        }

        info!(camera = self.camera.id, frames, events = emitted, "camera worker stopped");
        emitted
    }

    /// Handle one frame; returns how many events were sent
    pub fn process_frame(&mut self, frame: TrackedFrame) -> anyhow::Result<usize> {
        CAMERA_FRAMES_PROCESSED.with_label_values(&[&self.camera_label]).inc();

        let hour = frame.captured_at.hour();
        let plates: Vec<PlateObservation> = frame
            .detections
            .iter()
            .filter(|d| d.is_licence())
            .map(|d| self.read_plate(&frame, d, hour))
            .collect();

        self.board.publish(FrameSnapshot {
            camera: self.camera.id,
            published: Instant::now(),
            width: frame.width,
            height: frame.height,
            image: frame.image.clone(),
            objects: frame
                .detections
                .iter()
                .map(|d| LabelledBox {
                    bbox: d.bbox,
                    class_id: d.class_id,
                })
                .collect(),
        });

        let mut sent = 0;
        for boat in frame.detections.iter().filter(|d| !d.is_licence()) {
            let Some(track_id) = boat.track_id else {
                continue;
            };

            let reading = match best_plate_for_boat(&boat.bbox, &plates) {
                Some(plate) => {
                    let reading = &plate.reading;
                    if reading.has_text() {
                        let before = self.consensus.tracked();
                        self.consensus
                            .add_detection(track_id, &reading.text, reading.confidence, &reading.method);
                        OCR_CONSENSUS_TRACKS.add(self.consensus.tracked() as i64 - before as i64);
                    }
                    TrackReading {
                        text: reading.text.clone(),
                        confidence: reading.confidence,
                        method: reading.method.clone(),
                        quality_score: reading.quality_score,
                        preprocessing_methods: reading.preprocessing_methods.clone(),
                        processing_time: reading.processing_time,
                        identified: reading.has_text()
                            && self.reader.validator().known().contains(&reading.text),
                    }
                }
                None => TrackReading::none(),
            };

            let observation = Observation {
                track_id,
                class_id: boat.class_id,
                class_name: boat.class_name.clone(),
                confidence: boat.confidence,
                bbox: boat.bbox,
                reading,
            };
            let Some(direction) = self.crossings.observe(observation) else {
                continue;
            };

            if let Some(event) = self.log_crossing(track_id, direction, frame.captured_at) {
                self.events.send(event)?;
                sent += 1;
            }
        }

        CAMERA_ACTIVE_TRACKS
            .with_label_values(&[&self.camera_label])
            .set(self.crossings.len() as i64);
        Ok(sent)
    }

    fn read_plate(&self, frame: &TrackedFrame, plate: &Detection, hour: u32) -> PlateObservation {
        let reading = match &frame.image {
            Some(image) => self.reader.read(image, &plate.bbox, hour),
            None => self
                .reader
                .read_candidates(&plate.ocr_candidates, plate.quality_score),
        };
        PlateObservation {
            bbox: plate.bbox,
            detector_confidence: plate.confidence,
            reading,
        }
    }

    /// Resolve the consensus, mark the track logged and build its event
    fn log_crossing(
        &mut self,
        track_id: u64,
        direction: Direction,
        at: NaiveDateTime,
    ) -> Option<RawEvent> {
        let consensus = self.consensus.resolve(track_id);
        let known = self.reader.validator().known();
        let state = self.crossings.complete(track_id, &consensus, known)?;

        let event = RawEvent {
            camera: self.camera.id,
            track_id,
            class_id: state.class_id,
            class_name: state.class_name.clone(),
            direction,
            timestamp: format_timestamp(at),
            location: self.location.clone(),
            extracted_text: state.reading.text.clone(),
            identified_licence_number: LicenceMatch::from_bool(state.reading.identified),
            ocr_confidence: state.reading.confidence,
            confidence: state.confidence,
            ocr_method_used: state.reading.method.clone(),
            ocr_processing_time: state.reading.processing_time,
            frame_quality_score: state.reading.quality_score,
            preprocessing_methods: state.reading.preprocessing_methods.clone(),
        };

        CAMERA_CROSSINGS
            .with_label_values(&[&self.camera_label, &direction.to_string()])
            .inc();
        info!(
            camera = self.camera.id,
            track_id,
            class = %event.class_name,
            direction = %direction,
            text = %event.extracted_text,
            ocr_confidence = event.ocr_confidence,
            method = %event.ocr_method_used,
            "crossing logged"
        );

        self.save_snapshots(at, &event.class_name);
        Some(event)
    }

    fn save_snapshots(&self, at: NaiveDateTime, class_name: &str) {
        let Some(writer) = &self.snapshots else {
            return;
        };
        let recent = self
            .board
            .recent(self.tracker_config.snapshot_max_age, Instant::now());
        if recent.is_empty() {
            return;
        }

        let id = event_id(at, class_name, &self.location, &self.preserved_names);
        match writer.write(&id, &recent) {
            Ok(saved) => {
                CAMERA_SNAPSHOTS_SAVED.with_label_values(&["ok"]).inc();
                debug!(camera = self.camera.id, event_id = %id, saved, "event snapshots written");
            }
            Err(e) => {
                CAMERA_SNAPSHOTS_SAVED.with_label_values(&["error"]).inc();
                warn!(camera = self.camera.id, event_id = %id, error = %e, "failed to write event snapshots");
            }
        }
    }

    fn maybe_evict(&mut self) {
        if self.last_eviction.elapsed() < self.ocr_config.evict_interval {
            return;
        }
        let now = Instant::now();
        self.last_eviction = now;

        let readings = self.consensus.evict_stale_at(self.ocr_config.track_max_age, now);
        let tracks = self.crossings.evict_stale_at(self.ocr_config.track_max_age, now);
        OCR_CONSENSUS_TRACKS.sub(readings as i64);
        if readings > 0 || tracks > 0 {
            debug!(camera = self.camera.id, readings, tracks, "evicted stale tracks");
        }
    }
}
