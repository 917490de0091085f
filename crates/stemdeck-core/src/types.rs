//! Common types for Stemdeck
//!
//! Stem identifiers shared by the separation pipeline and the playback
//! coordinator.

use serde::{Deserialize, Serialize};

/// Number of stem kinds a separation can produce
pub const NUM_STEMS: usize = 5;

/// Stem identifiers
///
/// Ordering follows the mixer layout: vocals first, then the rhythm section,
/// then the catch-all stems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stem {
    Vocals,
    Drums,
    Bass,
    Other,
    Instrumental,
}

impl Stem {
    /// Get all stems in order
    pub const ALL: [Stem; NUM_STEMS] = [
        Stem::Vocals,
        Stem::Drums,
        Stem::Bass,
        Stem::Other,
        Stem::Instrumental,
    ];

    /// Parse a canonical stem name ("vocals", "drums", ...)
    ///
    /// Accepts the backend alias "accompaniment" for [`Stem::Instrumental`].
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "vocals" => Some(Stem::Vocals),
            "drums" => Some(Stem::Drums),
            "bass" => Some(Stem::Bass),
            "other" => Some(Stem::Other),
            "instrumental" | "accompaniment" => Some(Stem::Instrumental),
            _ => None,
        }
    }

    /// Canonical lowercase name, also used for file names
    pub fn name(&self) -> &'static str {
        match self {
            Stem::Vocals => "vocals",
            Stem::Drums => "drums",
            Stem::Bass => "bass",
            Stem::Other => "other",
            Stem::Instrumental => "instrumental",
        }
    }

    /// Display label for UI
    pub fn label(&self) -> &'static str {
        match self {
            Stem::Vocals => "Vocals",
            Stem::Drums => "Drums",
            Stem::Bass => "Bass",
            Stem::Other => "Other",
            Stem::Instrumental => "Instrumental",
        }
    }

    /// Name the separation backend uses for this stem
    ///
    /// Backends built on Spleeter call the instrumental mix "accompaniment".
    pub fn backend_name(&self) -> &'static str {
        match self {
            Stem::Instrumental => "accompaniment",
            other => other.name(),
        }
    }
}

impl std::fmt::Display for Stem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
