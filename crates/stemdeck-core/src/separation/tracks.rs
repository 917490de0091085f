//! Separation results

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::types::Stem;

/// Local files produced by a separation, keyed by stem
///
/// Tracks returned by the orchestrator remember the working directory that
/// holds their files; [`SeparationOrchestrator::discard`] deletes it.
///
/// [`SeparationOrchestrator::discard`]: super::SeparationOrchestrator::discard
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeparatedTracks {
    tracks: BTreeMap<Stem, PathBuf>,
    #[serde(skip)]
    work_dir: Option<PathBuf>,
}

impl SeparatedTracks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory owning the stem files, if they were produced by a separation call
    pub fn work_dir(&self) -> Option<&Path> {
        self.work_dir.as_deref()
    }

    pub(crate) fn with_work_dir(mut self, dir: PathBuf) -> Self {
        self.work_dir = Some(dir);
        self
    }

    pub fn insert(&mut self, stem: Stem, path: impl Into<PathBuf>) {
        self.tracks.insert(stem, path.into());
    }

    pub fn get(&self, stem: Stem) -> Option<&Path> {
        self.tracks.get(&stem).map(PathBuf::as_path)
    }

    pub fn contains(&self, stem: Stem) -> bool {
        self.tracks.contains_key(&stem)
    }

    /// Stems and paths in mixer order
    pub fn iter(&self) -> impl Iterator<Item = (Stem, &Path)> {
        self.tracks.iter().map(|(s, p)| (*s, p.as_path()))
    }

    pub fn stems(&self) -> Vec<Stem> {
        self.tracks.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

impl FromIterator<(Stem, PathBuf)> for SeparatedTracks {
    fn from_iter<I: IntoIterator<Item = (Stem, PathBuf)>>(iter: I) -> Self {
        Self {
            tracks: iter.into_iter().collect(),
            work_dir: None,
        }
    }
}
