//! Site configuration: which cameras watch a location and where their
//! counting lines are.

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::validation::{validate_name, validate_uri};

/// Orientation of the two counting lines in the image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LineOrientation {
    /// Lines are vertical; objects are tracked along x
    Vertical,
    /// Lines are horizontal; objects are tracked along y
    Horizontal,
}

impl fmt::Display for LineOrientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineOrientation::Vertical => write!(f, "vertical"),
            LineOrientation::Horizontal => write!(f, "horizontal"),
        }
    }
}

impl FromStr for LineOrientation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "vertical" => Ok(LineOrientation::Vertical),
            "horizontal" => Ok(LineOrientation::Horizontal),
            _ => Err(format!("Invalid orientation: {}", s)),
        }
    }
}

impl<'de> Deserialize<'de> for LineOrientation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One camera of a location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Camera number, unique within the location (1-based)
    pub id: u32,

    /// Stream URL handed to the external tracker
    pub url: String,

    /// First counting line position in pixels
    #[serde(default)]
    pub line1: i32,

    /// Second counting line position in pixels
    #[serde(default)]
    pub line2: i32,

    pub orientation: LineOrientation,
}

/// Cameras of one location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationConfig {
    pub cameras: Vec<CameraConfig>,
}

/// Resolved configuration for the active location
#[derive(Debug, Clone, PartialEq)]
pub struct SiteConfig {
    /// Location name exactly as configured (umlauts preserved)
    pub location: String,
    pub cameras: Vec<CameraConfig>,
}

impl SiteConfig {
    pub fn camera(&self, id: u32) -> Option<&CameraConfig> {
        self.cameras.iter().find(|c| c.id == id)
    }

    pub fn validate(&self) -> Result<()> {
        validate_name(&self.location, "location")?;
        if self.cameras.is_empty() {
            bail!("location '{}' has no cameras configured", self.location);
        }
        let mut seen = Vec::with_capacity(self.cameras.len());
        for camera in &self.cameras {
            if camera.id == 0 {
                bail!("camera ids are 1-based (location '{}')", self.location);
            }
            if seen.contains(&camera.id) {
                bail!(
                    "camera {} is configured twice for location '{}'",
                    camera.id,
                    self.location
                );
            }
            seen.push(camera.id);
            validate_uri(&camera.url, &format!("camera {} url", camera.id))?;
            if camera.line1 < 0 || camera.line2 < 0 {
                bail!("camera {} has a negative line position", camera.id);
            }
        }
        Ok(())
    }
}

/// All locations known to the installation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiteFile {
    pub locations: BTreeMap<String, LocationConfig>,
}

impl SiteFile {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read site file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse site file {}", path.display()))
    }

    pub fn location_names(&self) -> Vec<String> {
        self.locations.keys().cloned().collect()
    }

    /// Resolve and validate the configuration of one location
    pub fn site(&self, location: &str) -> Result<SiteConfig> {
        let entry = self.locations.get(location).ok_or_else(|| {
            anyhow!(
                "location '{}' is not configured (available: {})",
                location,
                self.location_names().join(", ")
            )
        })?;
        let site = SiteConfig {
            location: location.to_string(),
            cameras: entry.cameras.clone(),
        };
        site.validate()?;
        Ok(site)
    }
}
