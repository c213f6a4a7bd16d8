//! Detection sources feeding a camera worker.
//!
//! The detector/tracker model runs outside this process. A source yields its
//! per-frame output; [`ReplaySource`] reads it back from JSON lines so the
//! pipeline can run without a model attached.

use anyhow::{Context, Result};
use common::detections::{Detection, TrackedFrame};
use common::validation::{now_local, parse_timestamp};
use serde::Deserialize;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Longest pause inserted between replayed frames
const MAX_REPLAY_GAP: Duration = Duration::from_secs(1);

/// Per-frame tracker output for one camera
pub trait DetectionSource: Send {
    /// Next frame, `Ok(None)` once the stream has ended.
    ///
    /// An `Err` covers one bad frame; callers may keep reading.
    fn next_frame(&mut self) -> Result<Option<TrackedFrame>>;
}

/// One line of a replay file
#[derive(Debug, Deserialize)]
struct ReplayFrame {
    /// `YYYY-MM-DD HH:MM:SS`; missing means "now"
    #[serde(default)]
    captured_at: Option<String>,
    width: u32,
    height: u32,
    /// Grayscale copy of the frame, relative to the replay file
    #[serde(default)]
    image: Option<PathBuf>,
    #[serde(default)]
    detections: Vec<Detection>,
}

/// Tracker output replayed from a JSON-lines file
pub struct ReplaySource {
    path: PathBuf,
    base_dir: PathBuf,
    lines: Lines<BufReader<File>>,
    line_no: usize,
    realtime: bool,
    last_captured: Option<chrono::NaiveDateTime>,
}

impl ReplaySource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)
            .with_context(|| format!("failed to open replay file {}", path.display()))?;
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(Self {
            path,
            base_dir,
            lines: BufReader::new(file).lines(),
            line_no: 0,
            realtime: false,
            last_captured: None,
        })
    }

    /// Sleep between frames according to their capture times
    pub fn with_realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    /// Replay file of camera `camera` inside `dir`: `camera<N>.jsonl`
    pub fn for_camera(dir: impl AsRef<Path>, camera: u32) -> Result<Self> {
        Self::open(dir.as_ref().join(format!("camera{}.jsonl", camera)))
    }

    fn parse(&self, line: &str) -> Result<TrackedFrame> {
        let raw: ReplayFrame = serde_json::from_str(line).with_context(|| {
            format!("{}:{}: malformed replay frame", self.path.display(), self.line_no)
        })?;

        let captured_at = match raw.captured_at.as_deref() {
            Some(ts) => parse_timestamp(ts)?,
            None => now_local(),
        };

        let image = match raw.image {
            Some(rel) => {
                let full = self.base_dir.join(rel);
                let img = image::open(&full)
                    .with_context(|| format!("failed to load frame image {}", full.display()))?
                    .to_luma8();
                Some(Arc::new(img))
            }
            None => None,
        };

        Ok(TrackedFrame {
            captured_at,
            width: raw.width,
            height: raw.height,
            image,
            detections: raw.detections,
        })
    }

    fn pace(&mut self, captured_at: chrono::NaiveDateTime) {
        if let Some(previous) = self.last_captured {
            if let Ok(gap) = (captured_at - previous).to_std() {
                std::thread::sleep(gap.min(MAX_REPLAY_GAP));
            }
        }
        self.last_captured = Some(captured_at);
    }
}

impl DetectionSource for ReplaySource {
    fn next_frame(&mut self) -> Result<Option<TrackedFrame>> {
        loop {
            let Some(line) = self.lines.next() else {
                debug!(path = %self.path.display(), frames = self.line_no, "replay finished");
                return Ok(None);
            };
            self.line_no += 1;
            let line = line.with_context(|| format!("failed to read {}", self.path.display()))?;
            if line.trim().is_empty() {
                continue;
            }

            let frame = self.parse(&line)?;
            if self.realtime {
                self.pace(frame.captured_at);
            }
            return Ok(Some(frame));
        }
    }
}

/// Source yielding prepared frames, then ending
#[derive(Default)]
pub struct ScriptedSource {
    frames: VecDeque<Result<TrackedFrame>>,
}

impl ScriptedSource {
    pub fn new(frames: impl IntoIterator<Item = TrackedFrame>) -> Self {
        Self {
            frames: frames.into_iter().map(Ok).collect(),
        }
    }

    /// Queue a frame that fails to decode
    pub fn with_error(mut self, message: &str) -> Self {
        self.frames.push_back(Err(anyhow::anyhow!(message.to_string())));
        self
    }

    pub fn with_frame(mut self, frame: TrackedFrame) -> Self {
        self.frames.push_back(Ok(frame));
        self
    }
}

impl DetectionSource for ScriptedSource {
    fn next_frame(&mut self) -> Result<Option<TrackedFrame>> {
        self.frames.pop_front().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_replay_reads_frames_and_skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("camera2.jsonl");
        let mut file = File::create(&path).unwrap();
        let frame = r#"{"captured_at": "2025-06-01 10:00:00", "width": 640, "height": 480, "detections": [{"bbox": {"x1": 10, "y1": 10, "x2": 60, "y2": 40}, "class_id": 1, "class_name": "motorboat", "confidence": 0.8, "track_id": 4}]}"#;
        writeln!(file, "{}", frame).unwrap();
        writeln!(file).unwrap();
        writeln!(file, "{}", r#"{"width": 640, "height": 480}"#).unwrap();

        let mut source = ReplaySource::for_camera(dir.path(), 2).unwrap();
        let first = source.next_frame().unwrap().unwrap();
        assert_eq!(first.detections.len(), 1);
        assert_eq!(first.detections[0].track_id, Some(4));
        assert!(first.image.is_none());

        let second = source.next_frame().unwrap().unwrap();
        assert!(second.detections.is_empty());
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_replay_reports_bad_lines_and_continues() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("camera1.jsonl");
        std::fs::write(&path, "{not json}\n{\"width\": 10, \"height\": 10}\n").unwrap();

        let mut source = ReplaySource::open(&path).unwrap();
        assert!(source.next_frame().is_err());
        assert!(source.next_frame().unwrap().is_some());
    }

    #[test]
    fn test_replay_loads_frame_images() {
        let dir = tempfile::tempdir().unwrap();
        image::GrayImage::new(8, 6)
            .save(dir.path().join("f0.png"))
            .unwrap();
        std::fs::write(
            dir.path().join("camera3.jsonl"),
            "{\"width\": 8, \"height\": 6, \"image\": \"f0.png\"}\n",
        )
        .unwrap();

        let mut source = ReplaySource::for_camera(dir.path(), 3).unwrap();
        let frame = source.next_frame().unwrap().unwrap();
        assert_eq!(frame.image.unwrap().dimensions(), (8, 6));
    }

    #[test]
    fn test_missing_replay_file() {
        assert!(ReplaySource::open("/nonexistent/camera9.jsonl").is_err());
    }
}
