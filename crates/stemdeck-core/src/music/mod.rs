//! Music theory utilities for chord symbols
//!
//! Provides chord-symbol parsing ("Am", "G7", "F#maj7", "Bbsus4") and chord
//! tone spelling for the chord display.

use serde::{Deserialize, Serialize};

/// Note names indexed by semitone offset from C (sharps only)
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Chord quality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChordQuality {
    #[serde(rename = "major")]
    Major,
    #[serde(rename = "minor")]
    Minor,
    #[serde(rename = "diminished")]
    Diminished,
    #[serde(rename = "augmented")]
    Augmented,
    #[serde(rename = "sus2")]
    Sus2,
    #[serde(rename = "sus4")]
    Sus4,
    #[serde(rename = "7th")]
    Seventh,
    #[serde(rename = "maj7")]
    Major7,
    #[serde(rename = "min7")]
    Minor7,
}

impl ChordQuality {
    /// Semitone intervals above the root
    pub fn intervals(&self) -> &'static [u8] {
        match self {
            Self::Major => &[0, 4, 7],
            Self::Minor => &[0, 3, 7],
            Self::Diminished => &[0, 3, 6],
            Self::Augmented => &[0, 4, 8],
            Self::Sus2 => &[0, 2, 7],
            Self::Sus4 => &[0, 5, 7],
            Self::Seventh => &[0, 4, 7, 10],
            Self::Major7 => &[0, 4, 7, 11],
            Self::Minor7 => &[0, 3, 7, 10],
        }
    }

    /// Whether this quality has a minor third
    pub fn is_minor(&self) -> bool {
        matches!(self, Self::Minor | Self::Minor7 | Self::Diminished)
    }

    /// Parse the suffix following the root ("", "m", "7", "maj7", ...)
    fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "" | "maj" => Some(Self::Major),
            "m" | "min" | "-" => Some(Self::Minor),
            "dim" | "°" => Some(Self::Diminished),
            "aug" | "+" => Some(Self::Augmented),
            "sus2" => Some(Self::Sus2),
            "sus4" | "sus" => Some(Self::Sus4),
            "7" => Some(Self::Seventh),
            "maj7" | "M7" => Some(Self::Major7),
            "m7" | "min7" => Some(Self::Minor7),
            _ => None,
        }
    }
}

/// A parsed chord symbol: root pitch class plus quality
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChordSymbol {
    /// Root as semitone offset from C (0=C, 1=C#, ..., 11=B)
    pub root: u8,
    pub quality: ChordQuality,
}

impl ChordSymbol {
    pub const fn new(root: u8, quality: ChordQuality) -> Self {
        Self {
            root: root % 12,
            quality,
        }
    }

    /// Parse a chord symbol like "C", "Am", "G7", "F#maj7", "Bbsus4"
    ///
    /// Supported roots:
    /// - Single letter: C, D, E, F, G, A, B
    /// - With sharp: C#, D#, F#, G#, A#
    /// - With flat: Db, Eb, Gb, Ab, Bb
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let mut chars = s.char_indices().peekable();

        let (_, root_char) = chars.next()?;
        let base_root = match root_char.to_ascii_uppercase() {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return None,
        };

        let root = match chars.peek() {
            Some((_, '#')) => {
                chars.next();
                (base_root + 1) % 12
            }
            Some((_, 'b')) => {
                chars.next();
                (base_root + 11) % 12 // +11 is same as -1 mod 12
            }
            _ => base_root,
        };

        let suffix = chars.peek().map_or("", |&(i, _)| &s[i..]);
        let quality = ChordQuality::from_suffix(suffix)?;

        Some(Self { root, quality })
    }

    /// Chord tones spelled with sharps, root first
    pub fn notes(&self) -> Vec<String> {
        self.quality
            .intervals()
            .iter()
            .map(|interval| NOTE_NAMES[((self.root + interval) % 12) as usize].to_string())
            .collect()
    }
}

/// Root letter of a chord name ('A'..='G'), ignoring accidentals
pub fn root_letter(name: &str) -> Option<char> {
    name.trim()
        .chars()
        .next()
        .map(|c| c.to_ascii_uppercase())
        .filter(|c| ('A'..='G').contains(c))
}

/// Quality of a chord name, defaulting to major when the suffix is unknown
pub fn quality_of(name: &str) -> ChordQuality {
    ChordSymbol::parse(name).map_or(ChordQuality::Major, |c| c.quality)
}

/// Chord tones for a chord name, falling back to a C major triad
pub fn chord_notes(name: &str) -> Vec<String> {
    ChordSymbol::parse(name)
        .unwrap_or(ChordSymbol::new(0, ChordQuality::Major))
        .notes()
}
