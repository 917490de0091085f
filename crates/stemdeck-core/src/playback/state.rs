//! Coordinator state

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::transport::PlayerHandle;
use crate::types::Stem;

/// Per-stem playback state
#[derive(Debug, Clone, PartialEq)]
pub struct StemPlaybackState {
    pub stem: Stem,
    /// Stored volume (0.0 to 1.0), kept while muted
    pub volume: f32,
    pub muted: bool,
    pub handle: Option<PlayerHandle>,
    pub last_known_position_ms: u64,
}

impl StemPlaybackState {
    pub fn new(stem: Stem, volume: f32, handle: PlayerHandle) -> Self {
        Self {
            stem,
            volume,
            muted: false,
            handle: Some(handle),
            last_known_position_ms: 0,
        }
    }

    /// Volume the player should actually be at
    pub fn effective_volume(&self) -> f32 {
        if self.muted {
            0.0
        } else {
            self.volume
        }
    }
}

/// Lock-free playback state for UI access
///
/// Written by the coordinator and its drift task, read by anything that
/// needs the playhead without touching the coordinator's lock.
///
/// All operations use `Ordering::Relaxed` since we only need visibility,
/// not synchronization with other memory operations.
#[derive(Debug, Default)]
pub struct PlaybackAtomics {
    /// Shared playhead position in milliseconds
    pub position_ms: AtomicU64,
    /// Track duration in milliseconds, 0 if unknown
    pub duration_ms: AtomicU64,
    pub playing: AtomicBool,
    /// Set when the reference stem reached the end of the track
    pub finished: AtomicBool,
}

impl PlaybackAtomics {
    #[inline]
    pub fn position_ms(&self) -> u64 {
        self.position_ms.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn duration_ms(&self) -> u64 {
        self.duration_ms.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Relaxed)
    }

    pub(crate) fn set_position(&self, position_ms: u64) {
        self.position_ms.store(position_ms, Ordering::Relaxed);
    }

    pub(crate) fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::Relaxed);
    }

    pub(crate) fn set_finished(&self, finished: bool) {
        self.finished.store(finished, Ordering::Relaxed);
    }

    pub(crate) fn reset(&self, duration_ms: u64) {
        self.position_ms.store(0, Ordering::Relaxed);
        self.duration_ms.store(duration_ms, Ordering::Relaxed);
        self.playing.store(false, Ordering::Relaxed);
        self.finished.store(false, Ordering::Relaxed);
    }
}

/// Point-in-time copy of the coordinator state
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSnapshot {
    pub position_ms: u64,
    pub duration_ms: u64,
    pub is_playing: bool,
    pub reference: Option<Stem>,
    /// Loaded stems in mixer order
    pub stems: Vec<StemPlaybackState>,
}

impl PlaybackSnapshot {
    pub fn stem(&self, stem: Stem) -> Option<&StemPlaybackState> {
        self.stems.iter().find(|s| s.stem == stem)
    }
}

#[derive(Debug, Default)]
pub(crate) struct CoordinatorState {
    pub stems: BTreeMap<Stem, StemPlaybackState>,
    pub reference: Option<Stem>,
    pub is_playing: bool,
    /// Bumped by every seek; samples taken before it are stale
    pub seek_generation: u64,
}

impl CoordinatorState {
    /// Loaded players in mixer order
    pub fn handles(&self) -> Vec<(Stem, PlayerHandle)> {
        self.stems
            .values()
            .filter_map(|s| s.handle.map(|h| (s.stem, h)))
            .collect()
    }

    /// Store a sampled position taken at `generation`
    ///
    /// Returns false and leaves the state untouched when a seek happened
    /// while the sample was in flight.
    pub fn record_sample(&mut self, stem: Stem, position_ms: u64, generation: u64) -> bool {
        if generation != self.seek_generation {
            return false;
        }
        if let Some(s) = self.stems.get_mut(&stem) {
            s.last_known_position_ms = position_ms;
        }
        true
    }

    /// Pick the stem whose position stands for the whole mix
    ///
    /// Keeps the current reference while it is loaded, unmuted and not
    /// excluded; otherwise the first loaded unmuted stem, otherwise the
    /// first loaded stem.
    pub fn select_reference(&mut self, excluded: &[Stem]) -> Option<(Stem, PlayerHandle)> {
        let candidates: Vec<&StemPlaybackState> = self
            .stems
            .values()
            .filter(|s| s.handle.is_some() && !excluded.contains(&s.stem))
            .collect();

        let current = self
            .reference
            .and_then(|r| candidates.iter().find(|s| s.stem == r && !s.muted));
        let chosen = current
            .or_else(|| candidates.iter().find(|s| !s.muted))
            .or_else(|| candidates.first())
            .and_then(|s| s.handle.map(|h| (s.stem, h)));

        self.reference = chosen.map(|(stem, _)| stem);
        chosen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(muted: &[Stem]) -> CoordinatorState {
        let mut state = CoordinatorState::default();
        for (i, stem) in [Stem::Vocals, Stem::Drums, Stem::Bass].into_iter().enumerate() {
            let mut s = StemPlaybackState::new(stem, 1.0, PlayerHandle(i as u64 + 1));
            s.muted = muted.contains(&stem);
            state.stems.insert(stem, s);
        }
        state
    }

    #[test]
    fn test_reference_prefers_first_unmuted() {
        let mut s = state(&[Stem::Vocals]);
        assert_eq!(s.select_reference(&[]), Some((Stem::Drums, PlayerHandle(2))));
        assert_eq!(s.reference, Some(Stem::Drums));
    }

    #[test]
    fn test_reference_is_sticky() {
        let mut s = state(&[]);
        s.reference = Some(Stem::Bass);
        assert_eq!(s.select_reference(&[]).map(|r| r.0), Some(Stem::Bass));
    }

    #[test]
    fn test_reference_falls_back_to_first_loaded() {
        let mut s = state(&[Stem::Vocals, Stem::Drums, Stem::Bass]);
        assert_eq!(s.select_reference(&[]).map(|r| r.0), Some(Stem::Vocals));
        assert_eq!(s.select_reference(&[Stem::Vocals]).map(|r| r.0), Some(Stem::Drums));
    }

    #[test]
    fn test_sample_from_before_seek_is_dropped() {
        let mut s = state(&[]);
        let generation = s.seek_generation;
        assert!(s.record_sample(Stem::Drums, 1200, generation));
        assert_eq!(s.stems[&Stem::Drums].last_known_position_ms, 1200);

        s.seek_generation += 1;
        assert!(!s.record_sample(Stem::Drums, 1300, generation));
        assert_eq!(s.stems[&Stem::Drums].last_known_position_ms, 1200);
    }

    #[test]
    fn test_no_reference_without_stems() {
        let mut s = CoordinatorState::default();
        assert_eq!(s.select_reference(&[]), None);
    }

    #[test]
    fn test_effective_volume() {
        let mut s = StemPlaybackState::new(Stem::Bass, 0.7, PlayerHandle(1));
        assert_eq!(s.effective_volume(), 0.7);
        s.muted = true;
        assert_eq!(s.effective_volume(), 0.0);
    }
}
