use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Camera whose events open pending entries
    pub primary_camera: u32,

    /// Cameras whose events may close a pending entry
    pub secondary_cameras: Vec<u32>,

    /// How long a primary event waits for its secondary match
    pub timeout: Duration,

    /// Minimum time between two output files
    pub flush_interval: Duration,

    /// Width of the time bucket in the pending key
    pub bucket: Duration,

    /// Maximum pending entries before the oldest is closed early
    pub max_pending: usize,

    /// After stop, wait for pending entries to time out naturally
    pub await_pending_on_stop: bool,

    /// How long one receive waits before sweep and flush run
    pub recv_timeout: Duration,

    /// Root of `<location>/csv/` output directories
    pub output_root: PathBuf,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            primary_camera: 2,
            secondary_cameras: vec![1, 3],
            timeout: Duration::from_secs(20 * 60),
            flush_interval: Duration::from_secs(120),
            bucket: Duration::from_secs(5 * 60),
            max_pending: 1024,
            await_pending_on_stop: false,
            recv_timeout: Duration::from_secs(1),
            output_root: PathBuf::from("saved_data"),
        }
    }
}

impl AggregatorConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let secondary_cameras = env::var("AGG_SECONDARY_CAMERAS")
            .ok()
            .map(|v| parse_camera_list(&v))
            .filter(|ids| !ids.is_empty())
            .unwrap_or(defaults.secondary_cameras);

        Self {
            primary_camera: env::var("AGG_PRIMARY_CAMERA")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.primary_camera),
            secondary_cameras,
            timeout: env::var("AGG_TIMEOUT_MINUTES")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(|m| Duration::from_secs(m * 60))
                .unwrap_or(defaults.timeout),
            flush_interval: env::var("AGG_FLUSH_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.flush_interval),
            bucket: defaults.bucket,
            max_pending: env::var("AGG_MAX_PENDING")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_pending),
            await_pending_on_stop: env::var("AGG_AWAIT_PENDING_ON_STOP")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.await_pending_on_stop),
            recv_timeout: defaults.recv_timeout,
            output_root: env::var("MONITOR_OUTPUT_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_root),
        }
    }

    pub fn is_secondary(&self, camera: u32) -> bool {
        self.secondary_cameras.contains(&camera)
    }
}

/// `"1, 3"` -> `[1, 3]`; unparseable entries are skipped
pub fn parse_camera_list(value: &str) -> Vec<u32> {
    value
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect()
}
