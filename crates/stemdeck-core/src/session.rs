//! Player session
//!
//! The state shared by every screen of a player: the current source, its
//! separated stems, its chord progression and the components that produce
//! them. Everything changes through the named operations below; callers
//! hold the session by reference instead of reaching for globals.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::chords::{AnalysisError, Chord, ChordAnalyzer, ChordCursor, ChordProgression};
use crate::config::AppConfig;
use crate::playback::{PlaybackError, PlaybackSyncCoordinator};
use crate::separation::{ProgressCallback, SeparatedTracks, SeparationError, SeparationOrchestrator};
use crate::storage::{FileStorage, LocalStorage};
use crate::transport::AudioTransport;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("No source loaded")]
    NoSource,

    #[error(transparent)]
    Separation(#[from] SeparationError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Playback(#[from] PlaybackError),
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// Application state for one player
pub struct PlayerSession {
    orchestrator: SeparationOrchestrator,
    analyzer: ChordAnalyzer,
    coordinator: PlaybackSyncCoordinator,
    source: Option<PathBuf>,
    tracks: Option<SeparatedTracks>,
    progression: Option<ChordProgression>,
}

impl PlayerSession {
    pub fn new(
        orchestrator: SeparationOrchestrator,
        analyzer: ChordAnalyzer,
        coordinator: PlaybackSyncCoordinator,
    ) -> Self {
        Self {
            orchestrator,
            analyzer,
            coordinator,
            source: None,
            tracks: None,
            progression: None,
        }
    }

    /// Wire up local storage, the configured providers and `transport`
    pub fn from_config(config: &AppConfig, transport: Arc<dyn AudioTransport>) -> reqwest::Result<Self> {
        let client = config.separation.http_client()?;
        let storage: Arc<dyn FileStorage> = Arc::new(LocalStorage::new(client.clone()));
        let orchestrator = SeparationOrchestrator::from_settings(
            &config.separation,
            client,
            Arc::clone(&storage),
            config.work_dir(),
        );
        let analyzer = ChordAnalyzer::new(storage, config.chords.clone());
        let coordinator = PlaybackSyncCoordinator::new(transport, config.playback.clone());
        Ok(Self::new(orchestrator, analyzer, coordinator))
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn tracks(&self) -> Option<&SeparatedTracks> {
        self.tracks.as_ref()
    }

    pub fn progression(&self) -> Option<&ChordProgression> {
        self.progression.as_ref()
    }

    pub fn coordinator(&self) -> &PlaybackSyncCoordinator {
        &self.coordinator
    }

    pub fn orchestrator(&self) -> &SeparationOrchestrator {
        &self.orchestrator
    }

    /// Make `source` current, dropping the previous stems and chords
    pub async fn load_source(&mut self, source: impl Into<PathBuf>) {
        self.release_tracks().await;
        self.progression = None;
        let source = source.into();
        log::info!("Source set to {:?}", source);
        self.source = Some(source);
    }

    /// Separate the current source and load its stems for playback
    pub async fn separate_current(
        &mut self,
        progress: Option<ProgressCallback>,
    ) -> Result<&SeparatedTracks> {
        let source = self.source.as_deref().ok_or(SessionError::NoSource)?;
        let tracks = self.orchestrator.separate(source, progress).await?;
        if let Err(e) = self.coordinator.load_stems(&tracks).await {
            self.orchestrator.discard(&tracks).await;
            return Err(e.into());
        }
        if let Some(previous) = self.tracks.take() {
            self.orchestrator.discard(&previous).await;
        }
        Ok(self.tracks.insert(tracks))
    }

    /// Analyze the chords of the current source
    pub async fn analyze_current(&mut self) -> Result<&ChordProgression> {
        let source = self.source.as_deref().ok_or(SessionError::NoSource)?;
        let progression = self.analyzer.analyze(source).await?;
        Ok(self.progression.insert(progression))
    }

    /// Chord under the shared playhead
    pub fn current_chord(&self) -> Option<&Chord> {
        let progression = self.progression.as_ref()?;
        self.analyzer
            .active_chord(progression, self.coordinator.position_ms())
    }

    /// Current and upcoming chords under the shared playhead
    pub fn chord_cursor(&self) -> Option<ChordCursor<'_>> {
        let progression = self.progression.as_ref()?;
        Some(self.analyzer.cursor_at(progression, self.coordinator.position_ms()))
    }

    /// Leave the current source entirely
    pub async fn clear(&mut self) {
        self.release_tracks().await;
        self.source = None;
        self.progression = None;
    }

    /// Stop playback and delete the separated files
    async fn release_tracks(&mut self) {
        self.coordinator.unload_all().await;
        if let Some(tracks) = self.tracks.take() {
            self.orchestrator.discard(&tracks).await;
        }
    }
}
