//! Synchronized multi-stem playback
//!
//! One transport player per stem, driven in lockstep: play, pause and seek
//! fan out to every player concurrently, volume and mute touch one player.
//! A background task samples a reference stem every `drift_interval_ms` and
//! publishes the shared position through [`PlaybackAtomics`].

mod coordinator;
mod error;
mod state;

pub use coordinator::PlaybackSyncCoordinator;
pub use error::PlaybackError;
pub use state::{PlaybackAtomics, PlaybackSnapshot, StemPlaybackState};

use serde::{Deserialize, Serialize};

use crate::types::Stem;

/// Playback configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Reference stem sampling period
    pub drift_interval_ms: u64,
    /// Initial vocals volume after loading stems
    pub vocals_volume: f32,
    /// Initial volume of every other stem
    pub other_volume: f32,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            drift_interval_ms: 100,
            // Vocals solo
            vocals_volume: 1.0,
            other_volume: 0.0,
        }
    }
}

impl PlaybackConfig {
    /// Validate configuration values
    pub fn validate(&mut self) {
        self.drift_interval_ms = self.drift_interval_ms.clamp(10, 5000);
        self.vocals_volume = self.vocals_volume.clamp(0.0, 1.0);
        self.other_volume = self.other_volume.clamp(0.0, 1.0);
    }

    /// Volume a freshly loaded stem starts at
    pub fn initial_volume(&self, stem: Stem) -> f32 {
        match stem {
            Stem::Vocals => self.vocals_volume,
            _ => self.other_volume,
        }
    }
}
