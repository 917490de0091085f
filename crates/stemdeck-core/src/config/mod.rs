//! Application configuration
//!
//! One YAML file holds every section; missing keys fall back to defaults
//! and out-of-range values are clamped by [`AppConfig::validate`].
//!
//! ```ignore
//! use stemdeck_core::config::{default_config_path, load_config, AppConfig};
//!
//! let mut config: AppConfig = load_config(&default_config_path());
//! config.validate();
//! ```

mod io;
mod paths;

pub use io::{load_config, save_config};
pub use paths::{default_config_path, default_work_dir};

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::chords::ChordConfig;
use crate::playback::PlaybackConfig;
use crate::separation::SeparationSettings;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub separation: SeparationSettings,
    pub playback: PlaybackConfig,
    pub chords: ChordConfig,
}

impl AppConfig {
    /// Load and validate the config at `path`
    pub fn load(path: &Path) -> Self {
        let mut config: Self = load_config(path);
        config.validate();
        config
    }

    pub fn validate(&mut self) {
        self.separation.validate();
        self.playback.validate();
        self.chords.validate();
    }

    /// Root for separation working directories
    pub fn work_dir(&self) -> PathBuf {
        self.separation.work_dir.clone().unwrap_or_else(default_work_dir)
    }
}
