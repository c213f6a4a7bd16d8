//! Latest frame per camera and event snapshot files.
//!
//! Each camera worker publishes its most recent frame on a `watch` channel.
//! When any camera logs a crossing, the recent frames of all cameras are
//! saved next to each other together with YOLO label files.

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use common::detections::BoundingBox;
use common::validation::{sanitize_filename, FILE_STAMP_FORMAT};
use image::GrayImage;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, warn};

/// Box and class of one object in a snapshot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelledBox {
    pub bbox: BoundingBox,
    pub class_id: u32,
}

/// Immutable copy of a camera's most recent frame
#[derive(Debug, Clone)]
pub struct FrameSnapshot {
    pub camera: u32,
    pub published: Instant,
    pub width: u32,
    pub height: u32,
    pub image: Option<Arc<GrayImage>>,
    pub objects: Vec<LabelledBox>,
}

type Slot = watch::Sender<Option<Arc<FrameSnapshot>>>;

/// One `watch` channel per camera holding its latest snapshot
#[derive(Clone)]
pub struct SnapshotBoard {
    slots: Arc<BTreeMap<u32, Slot>>,
}

impl SnapshotBoard {
    pub fn new(cameras: impl IntoIterator<Item = u32>) -> Self {
        let slots = cameras
            .into_iter()
            .map(|id| (id, watch::channel(None).0))
            .collect();
        Self {
            slots: Arc::new(slots),
        }
    }

    /// Replace the latest snapshot of `snapshot.camera`
    pub fn publish(&self, snapshot: FrameSnapshot) {
        match self.slots.get(&snapshot.camera) {
            Some(slot) => {
                slot.send_replace(Some(Arc::new(snapshot)));
            }
            None => debug!(camera = snapshot.camera, "snapshot for unknown camera ignored"),
        }
    }

    pub fn subscribe(&self, camera: u32) -> Option<watch::Receiver<Option<Arc<FrameSnapshot>>>> {
        self.slots.get(&camera).map(watch::Sender::subscribe)
    }

    /// Latest snapshots younger than `max_age`, ordered by camera
    pub fn recent(&self, max_age: Duration, now: Instant) -> Vec<Arc<FrameSnapshot>> {
        self.slots
            .values()
            .filter_map(|slot| slot.borrow().clone())
            .filter(|s| now.saturating_duration_since(s.published) < max_age)
            .collect()
    }
}

/// `<YYYYmmdd_HHMMSS>_<class>_<location>`
pub fn event_id(at: NaiveDateTime, class_name: &str, location: &str, preserved: &[String]) -> String {
    format!(
        "{}_{}_{}",
        at.format(FILE_STAMP_FORMAT),
        sanitize_filename(class_name, preserved),
        sanitize_filename(location, preserved)
    )
}

/// Normalised YOLO label lines; boxes outside the frame are skipped
pub fn yolo_labels(objects: &[LabelledBox], width: u32, height: u32) -> Vec<String> {
    if width == 0 || height == 0 {
        return Vec::new();
    }
    let (w, h) = (width as f32, height as f32);

    objects
        .iter()
        .filter_map(|obj| {
            let (cx, cy) = obj.bbox.center();
            let (cx, cy) = (cx / w, cy / h);
            let (bw, bh) = (obj.bbox.width() / w, obj.bbox.height() / h);
            let valid = (0.0..=1.0).contains(&cx)
                && (0.0..=1.0).contains(&cy)
                && bw > 0.0
                && bw <= 1.0
                && bh > 0.0
                && bh <= 1.0;
            valid.then(|| format!("{} {:.6} {:.6} {:.6} {:.6}", obj.class_id, cx, cy, bw, bh))
        })
        .collect()
}

/// Writes snapshot sets under `<root>/<location>/events/<event_id>/`
#[derive(Debug, Clone)]
pub struct EventSnapshotWriter {
    events_dir: PathBuf,
}

impl EventSnapshotWriter {
    pub fn new(output_root: impl AsRef<Path>, location: &str) -> Self {
        Self {
            events_dir: output_root.as_ref().join(location).join("events"),
        }
    }

    pub fn event_dir(&self, event_id: &str) -> PathBuf {
        self.events_dir.join(event_id)
    }

    /// Save every snapshot that carries pixels; returns how many were saved
    pub fn write(&self, event_id: &str, snapshots: &[Arc<FrameSnapshot>]) -> Result<usize> {
        let dir = self.event_dir(event_id);
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;

        let mut saved = 0;
        for snapshot in snapshots {
            let Some(image) = &snapshot.image else {
                debug!(camera = snapshot.camera, event_id, "no frame available for snapshot");
                continue;
            };

            let base = format!("{}_camera{}", event_id, snapshot.camera);
            if let Err(e) = image.save(dir.join(format!("{}.png", base))) {
                warn!(camera = snapshot.camera, event_id, error = %e, "failed to save snapshot image");
                continue;
            }

            let labels = yolo_labels(&snapshot.objects, snapshot.width, snapshot.height);
            fs::write(dir.join(format!("{}.txt", base)), labels.join("\n"))
                .with_context(|| format!("failed to write labels for {}", base))?;
            saved += 1;
        }
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn snapshot(camera: u32, published: Instant, with_image: bool) -> FrameSnapshot {
        FrameSnapshot {
            camera,
            published,
            width: 100,
            height: 50,
            image: with_image.then(|| Arc::new(GrayImage::new(100, 50))),
            objects: vec![LabelledBox {
                bbox: BoundingBox::new(10.0, 10.0, 30.0, 20.0),
                class_id: 2,
            }],
        }
    }

    #[test]
    fn test_yolo_labels_normalise_and_skip_invalid() {
        let objects = vec![
            LabelledBox { bbox: BoundingBox::new(10.0, 10.0, 30.0, 20.0), class_id: 2 },
            LabelledBox { bbox: BoundingBox::new(90.0, 10.0, 90.0, 20.0), class_id: 1 },
            LabelledBox { bbox: BoundingBox::new(150.0, 10.0, 190.0, 20.0), class_id: 1 },
        ];
        let labels = yolo_labels(&objects, 100, 50);
        assert_eq!(labels, vec!["2 0.200000 0.300000 0.200000 0.200000"]);
    }

    #[test]
    fn test_board_returns_only_recent_frames() {
        let board = SnapshotBoard::new([1, 2, 3]);
        let now = Instant::now();
        board.publish(snapshot(1, now, true));
        board.publish(snapshot(3, now - Duration::from_secs(6), true));
        board.publish(snapshot(7, now, true));

        let recent = board.recent(Duration::from_secs(5), now);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].camera, 1);

        let rx = board.subscribe(1).unwrap();
        assert!(rx.borrow().is_some());
        assert!(board.subscribe(7).is_none());
    }

    #[test]
    fn test_event_id_sanitises_class_and_keeps_location() {
        let at = NaiveDate::from_ymd_opt(2025, 6, 1)
            .unwrap()
            .and_hms_opt(10, 4, 5)
            .unwrap();
        let preserved = vec!["Fürstenberg".to_string()];
        assert_eq!(
            event_id(at, "sailboat with cabin", "Fürstenberg", &preserved),
            "20250601_100405_sailboat_with_cabin_Fürstenberg"
        );
    }

    #[test]
    fn test_writer_saves_images_and_labels() {
        let dir = tempfile::tempdir().unwrap();
        let writer = EventSnapshotWriter::new(dir.path(), "Diemitz");
        let now = Instant::now();
        let snapshots = vec![
            Arc::new(snapshot(1, now, true)),
            Arc::new(snapshot(2, now, false)),
        ];

        let saved = writer.write("20250601_100405_boat_Diemitz", &snapshots).unwrap();
        assert_eq!(saved, 1);

        let event_dir = dir.path().join("Diemitz/events/20250601_100405_boat_Diemitz");
        assert!(event_dir.join("20250601_100405_boat_Diemitz_camera1.png").exists());
        let labels = fs::read_to_string(event_dir.join("20250601_100405_boat_Diemitz_camera1.txt")).unwrap();
        assert_eq!(labels, "2 0.200000 0.300000 0.200000 0.200000");
        assert!(!event_dir.join("20250601_100405_boat_Diemitz_camera2.png").exists());
    }
}
