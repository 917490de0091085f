//! Chord progression model
//!
//! Holds the chord timeline shown by the chord display and the derived
//! analysis (key, tempo). Progressions are produced by [`ChordAnalyzer`] and
//! never mutated afterwards; re-analysis yields a new instance.
//!
//! There is no audio chord recognition here: the analyzer is a deterministic
//! synthetic generator seeded by the audio content, so the same file always
//! gets the same timeline.

mod analyzer;
mod error;

pub use analyzer::{analyze_tempo, detect_key, suggest_next, ChordAnalyzer, KeyEstimate};
pub use error::AnalysisError;

pub use crate::music::ChordQuality;

use serde::{Deserialize, Serialize};

use crate::timeline::{self, TimeStamped};

/// One chord on the timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chord {
    /// Start time in milliseconds
    pub time_ms: u64,
    /// Chord symbol, e.g. "Am" or "G7"
    pub name: String,
    pub quality: ChordQuality,
    /// Detection confidence (0.0 to 1.0)
    pub confidence: f32,
    /// Chord tones, root first
    pub notes: Vec<String>,
    pub duration_ms: u64,
}

impl TimeStamped for Chord {
    fn time_ms(&self) -> u64 {
        self.time_ms
    }
}

/// Major or minor tonality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scale {
    Major,
    Minor,
}

impl Scale {
    pub fn label(&self) -> &'static str {
        match self {
            Scale::Major => "Major",
            Scale::Minor => "Minor",
        }
    }
}

/// An analyzed chord timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChordProgression {
    /// Chords sorted ascending by start time, first at 0
    pub chords: Vec<Chord>,
    /// Key label, e.g. "C Major"
    pub key: String,
    pub scale: Scale,
    pub tempo_bpm: u32,
    pub time_signature: String,
    /// Overall analysis confidence (0.0 to 1.0)
    pub confidence: f32,
}

impl ChordProgression {
    /// Chord active at `position_ms`
    pub fn active_chord(&self, position_ms: u64) -> Option<&Chord> {
        timeline::active_index(&self.chords, position_ms).map(|i| &self.chords[i])
    }

    /// Current chord plus the next three
    pub fn cursor_at(&self, position_ms: u64) -> ChordCursor<'_> {
        ChordCursor {
            current: self.active_chord(position_ms),
            upcoming: timeline::upcoming(&self.chords, position_ms, UPCOMING_CHORDS),
        }
    }

    /// End of the last chord
    pub fn duration_ms(&self) -> u64 {
        self.chords
            .last()
            .map_or(0, |c| c.time_ms + c.duration_ms)
    }

    /// Chord names in timeline order
    pub fn names(&self) -> Vec<&str> {
        self.chords.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Number of chords previewed after the current one
pub const UPCOMING_CHORDS: usize = 3;

/// Real-time view of the progression at one playback position
#[derive(Debug, Clone, Copy)]
pub struct ChordCursor<'a> {
    pub current: Option<&'a Chord>,
    pub upcoming: &'a [Chord],
}

impl ChordCursor<'_> {
    /// Current chord name followed by the upcoming names
    pub fn names(&self) -> Vec<&str> {
        self.current
            .into_iter()
            .chain(self.upcoming)
            .map(|c| c.name.as_str())
            .collect()
    }
}

/// Chord analysis configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChordConfig {
    /// Length of each generated chord
    pub chord_duration_ms: u64,
    /// Base progression repetitions when the source duration is unknown
    pub repeats: u32,
    /// Beats covered by one chord, used for tempo estimation
    pub beats_per_chord: u32,
    /// Upper bound on generated chords, whatever duration the source claims
    pub max_chords: u32,
}

impl Default for ChordConfig {
    fn default() -> Self {
        Self {
            chord_duration_ms: 4000,
            repeats: 3,
            beats_per_chord: 8, // Two bars of 4/4
            max_chords: 1000,
        }
    }
}

impl ChordConfig {
    /// Clamp values to usable ranges
    pub fn validate(&mut self) {
        self.chord_duration_ms = self.chord_duration_ms.clamp(250, 60_000);
        self.repeats = self.repeats.clamp(1, 1000);
        self.beats_per_chord = self.beats_per_chord.clamp(1, 32);
        self.max_chords = self.max_chords.clamp(1, 10_000);
    }
}
