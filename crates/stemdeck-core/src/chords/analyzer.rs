//! Deterministic chord timeline generation and derived analysis

use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sha2::{Digest, Sha256};

use super::{AnalysisError, Chord, ChordConfig, ChordCursor, ChordProgression, Scale};
use crate::music;
use crate::storage::FileStorage;

/// Base progressions the generator cycles through
const BASE_PROGRESSIONS: [&[&str]; 3] = [
    &["C", "Am", "F", "G"],
    &["Am", "F", "C", "G"],
    &["Dm", "G7", "C"],
];

/// Confidence assigned to suggested chords
const SUGGESTION_CONFIDENCE: f32 = 0.8;
const SUGGESTION_DURATION_MS: u64 = 4000;
const DEFAULT_TEMPO_BPM: u32 = 120;

/// Estimated key of a progression
#[derive(Debug, Clone, PartialEq)]
pub struct KeyEstimate {
    /// e.g. "A Minor"
    pub key: String,
    pub scale: Scale,
    pub confidence: f32,
}

/// Produces chord progressions for audio sources
pub struct ChordAnalyzer {
    storage: Arc<dyn FileStorage>,
    config: ChordConfig,
}

impl ChordAnalyzer {
    pub fn new(storage: Arc<dyn FileStorage>, mut config: ChordConfig) -> Self {
        config.validate();
        Self { storage, config }
    }

    pub fn config(&self) -> &ChordConfig {
        &self.config
    }

    /// Analyze a source, covering its WAV duration when the header can be read
    pub async fn analyze(&self, source: &Path) -> Result<ChordProgression, AnalysisError> {
        let bytes = self.read_source(source).await?;
        let duration_ms = wav_duration_ms(&bytes);
        if duration_ms.is_none() {
            log::debug!(
                "No WAV header in {:?}, using {} repeats",
                source.file_name().unwrap_or_default(),
                self.config.repeats
            );
        }
        Ok(self.generate(&bytes, duration_ms))
    }

    /// Analyze a source, covering an explicit duration
    pub async fn analyze_with_duration(
        &self,
        source: &Path,
        duration_ms: u64,
    ) -> Result<ChordProgression, AnalysisError> {
        let bytes = self.read_source(source).await?;
        Ok(self.generate(&bytes, Some(duration_ms)))
    }

    /// Chord active at `position_ms`, if any
    pub fn active_chord<'a>(
        &self,
        progression: &'a ChordProgression,
        position_ms: u64,
    ) -> Option<&'a Chord> {
        progression.active_chord(position_ms)
    }

    /// Current and upcoming chords at `position_ms`
    pub fn cursor_at<'a>(
        &self,
        progression: &'a ChordProgression,
        position_ms: u64,
    ) -> ChordCursor<'a> {
        progression.cursor_at(position_ms)
    }

    async fn read_source(&self, source: &Path) -> Result<Vec<u8>, AnalysisError> {
        self.storage
            .read(source)
            .await
            .map_err(|source_err| AnalysisError::Unresolvable {
                path: source.to_path_buf(),
                source: source_err,
            })
    }

    fn generate(&self, bytes: &[u8], duration_ms: Option<u64>) -> ChordProgression {
        let seed: [u8; 32] = Sha256::digest(bytes).into();
        let mut rng = ChaCha8Rng::from_seed(seed);

        let base = BASE_PROGRESSIONS[rng.random_range(0..BASE_PROGRESSIONS.len())];
        let chord_ms = self.config.chord_duration_ms;
        let max_chords = self.config.max_chords as u64;
        let wanted = match duration_ms {
            Some(d) => d.div_ceil(chord_ms).max(1),
            None => base.len() as u64 * self.config.repeats as u64,
        };
        if wanted > max_chords {
            log::warn!(
                "Source would need {} chords, capping at {}",
                wanted,
                max_chords
            );
        }
        let count = wanted.min(max_chords) as usize;

        let chords: Vec<Chord> = base
            .iter()
            .cycle()
            .take(count)
            .enumerate()
            .map(|(i, name)| Chord {
                time_ms: i as u64 * chord_ms,
                name: name.to_string(),
                quality: music::quality_of(name),
                confidence: rng.random_range(0.85..1.0),
                notes: music::chord_notes(name),
                duration_ms: chord_ms,
            })
            .collect();

        let confidence = chords.iter().map(|c| c.confidence).sum::<f32>() / chords.len() as f32;
        let key = detect_key(&chords);
        let tempo_bpm = analyze_tempo(&chords, self.config.beats_per_chord);

        log::info!(
            "Chord analysis: {} chords, key {}, {} BPM",
            chords.len(),
            key.key,
            tempo_bpm
        );

        ChordProgression {
            chords,
            key: key.key,
            scale: key.scale,
            tempo_bpm,
            time_signature: "4/4".to_string(),
            confidence,
        }
    }
}

/// Duration of a WAV file in milliseconds, `None` if the bytes aren't WAV
fn wav_duration_ms(bytes: &[u8]) -> Option<u64> {
    let reader = hound::WavReader::new(Cursor::new(bytes)).ok()?;
    let sample_rate = reader.spec().sample_rate as u64;
    if sample_rate == 0 {
        return None;
    }
    Some(reader.duration() as u64 * 1000 / sample_rate)
}

/// Estimate the key by majority vote on chord roots
///
/// Ties go to the root seen first. The scale is major unless minor-quality
/// chords outnumber the others.
pub fn detect_key(chords: &[Chord]) -> KeyEstimate {
    let mut order: Vec<char> = Vec::new();
    let mut votes: HashMap<char, usize> = HashMap::new();
    let mut minor = 0usize;

    for chord in chords {
        if chord.quality.is_minor() {
            minor += 1;
        }
        if let Some(root) = music::root_letter(&chord.name) {
            let count = votes.entry(root).or_insert(0);
            if *count == 0 {
                order.push(root);
            }
            *count += 1;
        }
    }

    let mut winner: Option<(char, usize)> = None;
    for root in order {
        let count = votes[&root];
        if winner.map_or(true, |(_, best)| count > best) {
            winner = Some((root, count));
        }
    }

    let Some((root, count)) = winner else {
        return KeyEstimate {
            key: "C Major".to_string(),
            scale: Scale::Major,
            confidence: 0.0,
        };
    };

    let scale = if chords.len() - minor >= minor {
        Scale::Major
    } else {
        Scale::Minor
    };

    KeyEstimate {
        key: format!("{} {}", root, scale.label()),
        scale,
        confidence: (0.6 + count as f32 / chords.len() as f32).min(0.95),
    }
}

/// Estimate tempo from chord spacing, snapped to 60..=180 in steps of 10
pub fn analyze_tempo(chords: &[Chord], beats_per_chord: u32) -> u32 {
    let (Some(first), Some(last)) = (chords.first(), chords.last()) else {
        return DEFAULT_TEMPO_BPM;
    };
    if chords.len() < 2 || last.time_ms <= first.time_ms {
        return DEFAULT_TEMPO_BPM;
    }

    let avg_interval = (last.time_ms - first.time_ms) as f64 / (chords.len() - 1) as f64;
    let bpm = 60_000.0 * beats_per_chord as f64 / avg_interval;
    let step = ((bpm - 60.0) / 10.0).round().clamp(0.0, 12.0) as u32;
    60 + step * 10
}

/// Likely next chords after `chord`
pub fn suggest_next(chord: &Chord) -> Vec<Chord> {
    let names: &[&str] = match chord.name.as_str() {
        "C" => &["Am", "F", "G", "Dm"],
        "Am" => &["F", "C", "G", "Dm"],
        "F" => &["C", "G", "Am", "Dm"],
        "G" => &["C", "Am", "F", "Em"],
        "Dm" => &["G", "C", "Am", "F"],
        "Em" => &["Am", "C", "D", "G"],
        _ => &["C", "Am", "F", "G"],
    };

    let start = chord.time_ms + chord.duration_ms;
    names
        .iter()
        .map(|name| Chord {
            time_ms: start,
            name: name.to_string(),
            quality: music::quality_of(name),
            confidence: SUGGESTION_CONFIDENCE,
            notes: music::chord_notes(name),
            duration_ms: SUGGESTION_DURATION_MS,
        })
        .collect()
}
