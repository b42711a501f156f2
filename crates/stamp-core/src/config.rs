//! TOML configuration for stamp sessions
//!
//! A config file describes the viewer settings, the stamp images to load
//! into the catalog, and optionally a list of placements to apply without
//! any user interaction (used by the command line tool).
//!
//! ```toml
//! [viewer]
//! display_scale = 1.5
//!
//! [[stamps]]
//! id = "approved"
//! label = "Approved"
//! file = "stamps/approved.png"
//!
//! [[placements]]
//! stamp = "approved"
//! page = 1
//! x = 300.0
//! y = 300.0
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::catalog::{ImageFormat, DEFAULT_STAMP_SIZE};
use crate::error::{Result, StampError};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StampConfig {
    #[serde(default)]
    pub viewer: ViewerSettings,
    #[serde(default)]
    pub stamps: Vec<StampEntry>,
    #[serde(default)]
    pub placements: Vec<PlacementEntry>,
}

impl StampConfig {
    /// Load and validate a config file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            StampError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a config from TOML text.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: StampConfig = toml::from_str(s)
            .map_err(|e| StampError::Config(format!("Failed to parse TOML configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.viewer.validate()?;

        let mut ids = HashSet::new();
        for stamp in &self.stamps {
            if !ids.insert(stamp.id.as_str()) {
                return Err(StampError::Config(format!("Duplicate stamp id: {}", stamp.id)));
            }
        }

        for (i, placement) in self.placements.iter().enumerate() {
            if !ids.contains(placement.stamp.as_str()) {
                return Err(StampError::Config(format!(
                    "Placement {} references unknown stamp '{}'",
                    i + 1,
                    placement.stamp
                )));
            }
            if placement.page == 0 {
                return Err(StampError::Config(format!(
                    "Placement {} has page 0 (pages start at 1)",
                    i + 1
                )));
            }
        }
        Ok(())
    }
}

/// Display and editing parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewerSettings {
    /// Display pixels per PDF point (default: 1.5)
    #[serde(default = "default_display_scale")]
    pub display_scale: f64,
    /// Smallest stamp size the size controls allow (default: 50)
    #[serde(default = "default_min_stamp_size")]
    pub min_stamp_size: f64,
    /// Largest stamp size the size controls allow (default: 300)
    #[serde(default = "default_max_stamp_size")]
    pub max_stamp_size: f64,
    /// Increment used by the +/- size controls (default: 10)
    #[serde(default = "default_size_step")]
    pub size_step: f64,
    /// Maximum undo depth, at least 1; unlimited when absent
    #[serde(default)]
    pub history_limit: Option<usize>,
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self {
            display_scale: default_display_scale(),
            min_stamp_size: default_min_stamp_size(),
            max_stamp_size: default_max_stamp_size(),
            size_step: default_size_step(),
            history_limit: None,
        }
    }
}

impl ViewerSettings {
    pub fn validate(&self) -> Result<()> {
        if !(self.display_scale.is_finite() && self.display_scale > 0.0) {
            return Err(StampError::Config(format!(
                "display_scale must be positive, got {}",
                self.display_scale
            )));
        }
        if !(self.min_stamp_size > 0.0 && self.min_stamp_size <= self.max_stamp_size) {
            return Err(StampError::Config(format!(
                "Invalid stamp size range {}..{}",
                self.min_stamp_size, self.max_stamp_size
            )));
        }
        if !(self.size_step > 0.0) {
            return Err(StampError::Config(format!(
                "size_step must be positive, got {}",
                self.size_step
            )));
        }
        if self.history_limit == Some(0) {
            return Err(StampError::Config(
                "history_limit must be at least 1; omit it for unlimited undo".to_string(),
            ));
        }
        Ok(())
    }

    pub fn clamp_size(&self, size: f64) -> f64 {
        size.clamp(self.min_stamp_size, self.max_stamp_size)
    }
}

fn default_display_scale() -> f64 {
    1.5
}

fn default_min_stamp_size() -> f64 {
    50.0
}

fn default_max_stamp_size() -> f64 {
    300.0
}

fn default_size_step() -> f64 {
    10.0
}

fn default_stamp_size() -> f64 {
    DEFAULT_STAMP_SIZE
}

/// One catalog image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StampEntry {
    pub id: String,
    pub label: String,
    /// Image path, relative to the config file
    pub file: PathBuf,
    #[serde(default = "default_stamp_size")]
    pub size: f64,
    /// Overrides detection from the file extension
    #[serde(default)]
    pub format: Option<ImageFormat>,
}

/// A stamp to place without interaction. Coordinates are display
/// coordinates at the configured scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementEntry {
    pub stamp: String,
    pub page: u32,
    pub x: f64,
    pub y: f64,
    /// Defaults to the stamp's own size
    #[serde(default)]
    pub size: Option<f64>,
}
