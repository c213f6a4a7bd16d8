use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Root of `<location>/events/...` snapshot directories
    pub output_root: PathBuf,

    /// Save frames of all cameras whenever a crossing is logged
    pub save_snapshots: bool,

    /// Frames older than this are left out of event snapshots
    pub snapshot_max_age: Duration,

    /// Replay sources sleep between frames like a live stream
    pub replay_realtime: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("saved_data"),
            save_snapshots: true,
            snapshot_max_age: Duration::from_secs(5),
            replay_realtime: false,
        }
    }
}

impl TrackerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            output_root: env::var("MONITOR_OUTPUT_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_root),
            save_snapshots: env::var("TRACKER_SNAPSHOTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.save_snapshots),
            snapshot_max_age: env::var("TRACKER_SNAPSHOT_MAX_AGE_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.snapshot_max_age),
            replay_realtime: env::var("REPLAY_REALTIME")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.replay_realtime),
        }
    }

    pub fn with_output_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.output_root = root.into();
        self
    }
}
