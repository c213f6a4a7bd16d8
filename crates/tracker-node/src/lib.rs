pub mod config;
pub mod crossing;
pub mod snapshots;
pub mod source;
pub mod worker;

pub use config::TrackerConfig;
pub use crossing::{CrossingTracker, TrackPhase, TrackedObjectState};
pub use snapshots::SnapshotBoard;
pub use source::{DetectionSource, ReplaySource, ScriptedSource};
pub use worker::CameraWorker;
