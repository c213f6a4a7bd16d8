use aggregator::AggregatorConfig;
use clap::Parser;
use common::site::SiteConfig;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracker_node::TrackerConfig;

/// Inconsistent camera roles or timing for the active location
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("camera {camera} is not configured for location '{location}'")]
    UnknownCamera { camera: u32, location: String },

    #[error("camera {0} cannot be both primary and secondary")]
    PrimaryIsSecondary(u32),

    #[error("at least one secondary camera is required")]
    NoSecondaryCameras,

    #[error("timeout must be at least one minute")]
    ZeroTimeout,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "boat-monitor")]
#[command(about = "Counts boats passing a location from several cameras", long_about = None)]
pub struct MonitorConfig {
    /// JSON file with the cameras of every location
    #[arg(long, env = "SITE_FILE", default_value = "config/sites.json")]
    pub site_file: PathBuf,

    /// Location to monitor, as named in the site file
    #[arg(long, env = "MONITOR_LOCATION")]
    pub location: String,

    /// Known commercial identifiers, one per line
    #[arg(long, env = "KNOWN_IDENTIFIERS_FILE")]
    pub known_identifiers: Option<PathBuf>,

    /// Directory holding `camera<N>.jsonl` tracker output
    #[arg(long, env = "REPLAY_DIR")]
    pub replay_dir: PathBuf,

    /// Pace replayed frames by their capture times
    #[arg(long, env = "REPLAY_REALTIME")]
    pub realtime: bool,

    #[arg(long, env = "MONITOR_OUTPUT_ROOT", default_value = "saved_data")]
    pub output_root: PathBuf,

    /// How long an entry waits for its exit camera
    #[arg(long, env = "AGG_TIMEOUT_MINUTES", default_value_t = 20)]
    pub timeout_minutes: u64,

    #[arg(long, env = "AGG_FLUSH_INTERVAL_SECS", default_value_t = 120)]
    pub flush_secs: u64,

    #[arg(long, env = "AGG_PRIMARY_CAMERA", default_value_t = 2)]
    pub primary_camera: u32,

    #[arg(long, env = "AGG_SECONDARY_CAMERAS", value_delimiter = ',', default_value = "1,3")]
    pub secondary_cameras: Vec<u32>,

    /// Keep running after stop until pending entries time out on their own
    #[arg(long, env = "AGG_AWAIT_PENDING_ON_STOP")]
    pub await_pending: bool,

    /// Seconds camera workers get to stop before they are abandoned
    #[arg(long, env = "SHUTDOWN_GRACE_SECS", default_value_t = 5)]
    pub shutdown_grace_secs: u64,
}

impl MonitorConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// Check camera roles against the cameras of `site`
    pub fn validate(&self, site: &SiteConfig) -> Result<(), ConfigError> {
        if self.timeout_minutes == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.secondary_cameras.is_empty() {
            return Err(ConfigError::NoSecondaryCameras);
        }
        if self.secondary_cameras.contains(&self.primary_camera) {
            return Err(ConfigError::PrimaryIsSecondary(self.primary_camera));
        }

        let roles = std::iter::once(&self.primary_camera).chain(&self.secondary_cameras);
        for &camera in roles {
            if site.camera(camera).is_none() {
                return Err(ConfigError::UnknownCamera {
                    camera,
                    location: site.location.clone(),
                });
            }
        }
        Ok(())
    }

    /// Aggregator settings from the environment, overridden by these options
    pub fn aggregator_config(&self) -> AggregatorConfig {
        AggregatorConfig {
            primary_camera: self.primary_camera,
            secondary_cameras: self.secondary_cameras.clone(),
            timeout: Duration::from_secs(self.timeout_minutes * 60),
            flush_interval: Duration::from_secs(self.flush_secs),
            await_pending_on_stop: self.await_pending,
            output_root: self.output_root.clone(),
            ..AggregatorConfig::from_env()
        }
    }

    pub fn tracker_config(&self) -> TrackerConfig {
        let mut config = TrackerConfig::from_env().with_output_root(&self.output_root);
        config.replay_realtime |= self.realtime;
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::site::{CameraConfig, LineOrientation};

    fn site(ids: &[u32]) -> SiteConfig {
        SiteConfig {
            location: "Diemitz".to_string(),
            cameras: ids
                .iter()
                .map(|&id| CameraConfig {
                    id,
                    url: format!("rtsp://10.0.0.{}/stream", id),
                    line1: 100,
                    line2: 200,
                    orientation: LineOrientation::Vertical,
                })
                .collect(),
        }
    }

    fn parse(args: &[&str]) -> MonitorConfig {
        let mut argv = vec!["boat-monitor", "--location", "Diemitz", "--replay-dir", "replay"];
        argv.extend_from_slice(args);
        MonitorConfig::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults_match_three_camera_layout() {
        let config = parse(&[]);
        assert_eq!(config.primary_camera, 2);
        assert_eq!(config.secondary_cameras, vec![1, 3]);
        assert_eq!(config.timeout_minutes, 20);
        assert_eq!(config.flush_secs, 120);
        assert!(config.validate(&site(&[1, 2, 3])).is_ok());

        let agg = config.aggregator_config();
        assert_eq!(agg.timeout, Duration::from_secs(1200));
        assert_eq!(agg.flush_interval, Duration::from_secs(120));
        assert!(!agg.await_pending_on_stop);
    }

    #[test]
    fn test_camera_list_parsing() {
        let config = parse(&["--primary-camera", "1", "--secondary-cameras", "2,4"]);
        assert_eq!(config.secondary_cameras, vec![2, 4]);
        assert_eq!(
            config.validate(&site(&[1, 2, 3])),
            Err(ConfigError::UnknownCamera {
                camera: 4,
                location: "Diemitz".to_string()
            })
        );
    }

    #[test]
    fn test_invalid_roles_rejected() {
        let config = parse(&["--secondary-cameras", "2"]);
        assert_eq!(
            config.validate(&site(&[1, 2, 3])),
            Err(ConfigError::PrimaryIsSecondary(2))
        );

        let config = parse(&["--timeout-minutes", "0"]);
        assert_eq!(config.validate(&site(&[1, 2, 3])), Err(ConfigError::ZeroTimeout));
    }
}
