//! Provider fallback and result validation
//!
//! Providers run strictly one at a time in priority order:
//!
//! ```text
//! Idle ──► Requesting(0) ──ok──► Succeeded
//!              │ err
//!              ▼
//!          Requesting(1) ──ok──► Succeeded
//!              │ err
//!              ▼
//!             ...  ──────────► Failed (every attempt recorded)
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::community::CommunityApiProvider;
use super::config::{ProviderKind, SeparationOptions, SeparationSettings};
use super::error::{AllProvidersFailed, ProviderError, ProviderFailure, Result, SeparationError};
use super::heuristic::HeuristicProvider;
use super::polling::JobPollingProvider;
use super::progress::{ProgressCallback, ProgressSink, SeparationStage};
use super::provider::{SeparationProvider, SeparationRequest};
use super::remote::RemoteBackendProvider;
use super::silence::SilenceStubProvider;
use super::tracks::SeparatedTracks;
use super::workdir::AttemptDir;
use crate::storage::FileStorage;

/// Runs separation providers with progressive fallback
pub struct SeparationOrchestrator {
    providers: Vec<Arc<dyn SeparationProvider>>,
    storage: Arc<dyn FileStorage>,
    work_root: PathBuf,
    options: SeparationOptions,
}

impl SeparationOrchestrator {
    pub fn new(
        providers: Vec<Arc<dyn SeparationProvider>>,
        storage: Arc<dyn FileStorage>,
        work_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            providers,
            storage,
            work_root: work_root.into(),
            options: SeparationOptions::default(),
        }
    }

    /// Build the provider chain described by `settings`
    pub fn from_settings(
        settings: &SeparationSettings,
        client: reqwest::Client,
        storage: Arc<dyn FileStorage>,
        work_root: impl Into<PathBuf>,
    ) -> Self {
        let providers = settings
            .providers
            .iter()
            .map(|kind| -> Arc<dyn SeparationProvider> {
                match kind {
                    ProviderKind::Remote => Arc::new(RemoteBackendProvider::new(
                        client.clone(),
                        Arc::clone(&storage),
                        settings.remote.clone(),
                    )),
                    ProviderKind::Community => Arc::new(CommunityApiProvider::new(
                        client.clone(),
                        Arc::clone(&storage),
                        settings.community.clone(),
                    )),
                    ProviderKind::Polling => Arc::new(JobPollingProvider::new(
                        client.clone(),
                        Arc::clone(&storage),
                        settings.polling.clone(),
                    )),
                    ProviderKind::Heuristic => {
                        Arc::new(HeuristicProvider::new(Arc::clone(&storage)))
                    }
                    ProviderKind::Silence => {
                        Arc::new(SilenceStubProvider::new(Arc::clone(&storage)))
                    }
                }
            })
            .collect();

        Self::new(providers, storage, work_root).with_options(settings.options.clone())
    }

    /// Default options used by [`separate`](Self::separate)
    pub fn with_options(mut self, options: SeparationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &SeparationOptions {
        &self.options
    }

    /// Provider names in priority order
    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub fn work_root(&self) -> &Path {
        &self.work_root
    }

    /// Separate `source` with the default options
    pub async fn separate(
        &self,
        source: &Path,
        progress: Option<ProgressCallback>,
    ) -> Result<SeparatedTracks> {
        self.separate_with(source, &self.options, progress).await
    }

    /// Separate `source` into the stems named by `options`
    ///
    /// Progress never decreases and ends with a single `Complete` at 100 on
    /// success. Dropping the returned future abandons in-flight requests and
    /// removes the call's working directory.
    pub async fn separate_with(
        &self,
        source: &Path,
        options: &SeparationOptions,
        progress: Option<ProgressCallback>,
    ) -> Result<SeparatedTracks> {
        if self.providers.is_empty() {
            return Err(SeparationError::NoProviders);
        }
        if !self.storage.exists(source).await {
            return Err(SeparationError::SourceMissing(source.to_path_buf()));
        }

        let attempt = AttemptDir::create(self.storage.as_ref(), &self.work_root).await?;
        let sink = ProgressSink::new(progress);
        let mut failures: Vec<ProviderFailure> = Vec::new();

        for provider in &self.providers {
            let name = provider.name();
            if let Some(previous) = failures.last() {
                log::warn!(
                    "Separation provider {} failed ({}), trying {}",
                    previous.provider,
                    previous.error,
                    name
                );
                sink.emit(
                    SeparationStage::Processing,
                    sink.last(),
                    format!("{} failed, trying {}", previous.provider, name),
                );
            }

            log::info!("Separating {:?} with {}", source.file_name().unwrap_or_default(), name);
            let work_dir = attempt.provider_dir(name);
            let window = sink.provider_window();
            let outcome = self
                .run_provider(provider.as_ref(), source, options, &work_dir, &window)
                .await;

            match outcome {
                Ok(tracks) => {
                    sink.emit(SeparationStage::Complete, 100.0, "Separation complete!");
                    log::info!("Separation succeeded with {} ({} stems)", name, tracks.len());
                    return Ok(tracks.with_work_dir(attempt.commit()));
                }
                Err(error) => {
                    if let Err(e) = self.storage.delete(&work_dir).await {
                        log::warn!("Failed to clean up {:?}: {}", work_dir, e);
                    }
                    failures.push(ProviderFailure {
                        provider: name,
                        stage: window.stage_reached().unwrap_or(SeparationStage::Uploading),
                        error,
                    });
                }
            }
        }

        attempt.remove(self.storage.as_ref()).await;
        let err = AllProvidersFailed { failures };
        log::warn!("{}", err);
        Err(err.into())
    }

    /// Delete the files of a finished separation
    ///
    /// Only directories under this orchestrator's work root are touched.
    pub async fn discard(&self, tracks: &SeparatedTracks) {
        let Some(dir) = tracks.work_dir() else {
            return;
        };
        if !dir.starts_with(&self.work_root) {
            log::warn!("Not discarding {:?}: outside {:?}", dir, self.work_root);
            return;
        }
        match self.storage.delete(dir).await {
            Ok(()) => log::debug!("Discarded separation output {:?}", dir),
            Err(e) => log::warn!("Failed to discard separation output {:?}: {}", dir, e),
        }
    }

    /// Remove every working directory under the work root
    ///
    /// Meant for startup or shutdown; tracks from calls still in flight or
    /// still loaded lose their files.
    pub async fn cleanup_work_dir(&self) -> Result<()> {
        self.storage.delete(&self.work_root).await?;
        log::info!("Cleaned separation working directory {:?}", self.work_root);
        Ok(())
    }

    async fn run_provider(
        &self,
        provider: &dyn SeparationProvider,
        source: &Path,
        options: &SeparationOptions,
        work_dir: &Path,
        window: &ProgressSink,
    ) -> std::result::Result<SeparatedTracks, ProviderError> {
        self.storage.make_dir(work_dir).await?;
        let request = SeparationRequest {
            source,
            options,
            work_dir,
        };
        let tracks = provider.separate(&request, window).await?;
        self.validate(tracks, options).await
    }

    /// Keep exactly the requested stems, each pointing at an existing file
    async fn validate(
        &self,
        tracks: SeparatedTracks,
        options: &SeparationOptions,
    ) -> std::result::Result<SeparatedTracks, ProviderError> {
        let mut valid = SeparatedTracks::new();
        for stem in options.requested_stems() {
            let path = match tracks.get(stem) {
                Some(p) if !p.as_os_str().is_empty() => p,
                _ => return Err(ProviderError::MissingStem(stem)),
            };
            if !self.storage.exists(path).await {
                return Err(ProviderError::MissingStem(stem));
            }
            valid.insert(stem, path);
        }
        Ok(valid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::separation::progress::SeparationProgress;
    use crate::separation::provider::ProviderTier;
    use crate::storage::LocalStorage;
    use crate::types::Stem;

    #[derive(Clone, Copy)]
    enum Script {
        Succeed,
        Fail,
        Omit(Stem),
        Extra,
        Hang,
    }

    struct Scripted {
        name: &'static str,
        script: Script,
    }

    fn scripted(name: &'static str, script: Script) -> Arc<dyn SeparationProvider> {
        Arc::new(Scripted { name, script })
    }

    #[async_trait]
    impl SeparationProvider for Scripted {
        fn name(&self) -> &'static str {
            self.name
        }

        fn tier(&self) -> ProviderTier {
            ProviderTier::Genuine
        }

        async fn separate(
            &self,
            request: &SeparationRequest<'_>,
            progress: &ProgressSink,
        ) -> std::result::Result<SeparatedTracks, ProviderError> {
            progress.report(SeparationStage::Uploading, 50.0, format!("{} uploading", self.name));

            let mut tracks = SeparatedTracks::new();
            for stem in request.stems() {
                let path = request.stem_path(stem, "wav");
                std::fs::write(&path, stem.name()).unwrap();
                tracks.insert(stem, path);
            }

            match self.script {
                Script::Succeed => Ok(tracks),
                Script::Fail => Err(ProviderError::Status {
                    status: 502,
                    message: format!("{} is down", self.name),
                }),
                Script::Omit(stem) => {
                    let kept = tracks.iter().filter(|(s, _)| *s != stem).map(|(s, p)| (s, p.to_path_buf()));
                    Ok(kept.collect())
                }
                Script::Extra => {
                    let path = request.work_dir.join("extra.wav");
                    std::fs::write(&path, b"extra").unwrap();
                    tracks.insert(Stem::Drums, path);
                    Ok(tracks)
                }
                Script::Hang => std::future::pending().await,
            }
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        source: PathBuf,
        work_root: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("song.mp3");
        std::fs::write(&source, b"song").unwrap();
        let work_root = dir.path().join("work");
        Fixture {
            source,
            work_root,
            _dir: dir,
        }
    }

    fn orchestrator(f: &Fixture, providers: Vec<Arc<dyn SeparationProvider>>) -> SeparationOrchestrator {
        SeparationOrchestrator::new(providers, Arc::new(LocalStorage::default()), &f.work_root)
    }

    fn recording() -> (ProgressCallback, Arc<Mutex<Vec<SeparationProgress>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let cb: ProgressCallback = Arc::new(move |p| sink.lock().unwrap().push(p));
        (cb, events)
    }

    fn assert_monotonic(events: &[SeparationProgress]) {
        for pair in events.windows(2) {
            assert!(
                pair[1].progress >= pair[0].progress,
                "progress went backwards: {:?} -> {:?}",
                pair[0],
                pair[1]
            );
        }
    }

    fn attempt_dirs(work_root: &Path) -> usize {
        std::fs::read_dir(work_root).map_or(0, |d| d.count())
    }

    #[tokio::test]
    async fn test_first_provider_success() {
        let f = fixture();
        let orch = orchestrator(&f, vec![scripted("a", Script::Succeed), scripted("b", Script::Fail)]);
        let (cb, events) = recording();

        let tracks = orch.separate(&f.source, Some(cb)).await.unwrap();
        assert_eq!(tracks.stems(), Stem::ALL.to_vec());
        assert!(tracks.get(Stem::Vocals).unwrap().starts_with(&f.work_root));
        assert!(tracks.get(Stem::Vocals).unwrap().to_string_lossy().contains("/a/"));

        let events = events.lock().unwrap();
        assert_monotonic(&events);
        let completes: Vec<_> = events.iter().filter(|e| e.stage == SeparationStage::Complete).collect();
        assert_eq!(completes.len(), 1);
        assert_eq!(events.last().unwrap().stage, SeparationStage::Complete);
        assert_eq!(events.last().unwrap().progress, 100.0);
        assert!(events.iter().all(|e| !e.message.contains("trying")));
    }

    #[tokio::test]
    async fn test_fallback_to_next_provider() {
        let f = fixture();
        let orch = orchestrator(&f, vec![scripted("remote", Script::Fail), scripted("heuristic", Script::Succeed)]);
        let (cb, events) = recording();

        let tracks = orch.separate(&f.source, Some(cb)).await.unwrap();
        assert!(tracks.get(Stem::Bass).unwrap().to_string_lossy().contains("heuristic"));

        let events = events.lock().unwrap();
        assert_monotonic(&events);
        let notice = events
            .iter()
            .find(|e| e.message == "remote failed, trying heuristic")
            .expect("fallback notice");
        assert_eq!(notice.stage, SeparationStage::Processing);
        assert_eq!(notice.progress, 47.5);
        assert_eq!(events.last().unwrap().progress, 100.0);

        // Failed provider's directory is gone, the winner's remains
        let attempt = std::fs::read_dir(&f.work_root).unwrap().next().unwrap().unwrap().path();
        assert!(!attempt.join("remote").exists());
        assert!(attempt.join("heuristic").is_dir());
    }

    #[tokio::test]
    async fn test_all_providers_fail() {
        let f = fixture();
        let orch = orchestrator(&f, vec![scripted("remote", Script::Fail), scripted("community", Script::Fail)]);
        let (cb, events) = recording();

        let err = orch.separate(&f.source, Some(cb)).await.unwrap_err();
        let all = match err {
            SeparationError::AllProvidersFailed(all) => all,
            other => panic!("unexpected error: {other}"),
        };
        let names: Vec<&str> = all.failures.iter().map(|f| f.provider).collect();
        assert_eq!(names, vec!["remote", "community"]);
        assert!(all.failures.iter().all(|f| f.stage == SeparationStage::Uploading));

        let text = all.to_string();
        assert!(text.contains("community is down"));
        assert!(text.contains("remote is down"));
        assert!(text.contains("internet connection"));

        let events = events.lock().unwrap();
        assert_monotonic(&events);
        assert!(events.iter().all(|e| e.stage != SeparationStage::Complete));
        assert_eq!(attempt_dirs(&f.work_root), 0);
    }

    #[tokio::test]
    async fn test_missing_stem_triggers_fallback() {
        let f = fixture();
        let orch = orchestrator(
            &f,
            vec![scripted("partial", Script::Omit(Stem::Drums)), scripted("full", Script::Succeed)],
        );
        let tracks = orch.separate(&f.source, None).await.unwrap();
        assert!(tracks.get(Stem::Drums).unwrap().to_string_lossy().contains("full"));
    }

    #[tokio::test]
    async fn test_missing_stem_is_recorded() {
        let f = fixture();
        let orch = orchestrator(&f, vec![scripted("partial", Script::Omit(Stem::Other))]);
        let err = orch.separate(&f.source, None).await.unwrap_err();
        let all = match err {
            SeparationError::AllProvidersFailed(all) => all,
            other => panic!("unexpected error: {other}"),
        };
        assert!(matches!(all.failures[0].error, ProviderError::MissingStem(Stem::Other)));
    }

    #[tokio::test]
    async fn test_extra_stems_are_dropped() {
        let f = fixture();
        let orch = orchestrator(&f, vec![scripted("a", Script::Extra)]);
        let options = SeparationOptions::with_stems([Stem::Vocals]);
        let tracks = orch.separate_with(&f.source, &options, None).await.unwrap();
        assert_eq!(tracks.stems(), vec![Stem::Vocals]);
    }

    #[tokio::test]
    async fn test_source_missing_and_no_providers() {
        let f = fixture();
        let orch = orchestrator(&f, vec![]);
        assert!(matches!(
            orch.separate(&f.source, None).await,
            Err(SeparationError::NoProviders)
        ));

        let orch = orchestrator(&f, vec![scripted("a", Script::Succeed)]);
        let missing = f.source.with_file_name("missing.mp3");
        assert!(matches!(
            orch.separate(&missing, None).await,
            Err(SeparationError::SourceMissing(p)) if p == missing
        ));
        assert_eq!(attempt_dirs(&f.work_root), 0);
    }

    #[tokio::test]
    async fn test_abandoned_call_removes_working_dir() {
        let f = fixture();
        let orch = orchestrator(&f, vec![scripted("slow", Script::Hang)]);
        let result = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            orch.separate(&f.source, None),
        )
        .await;
        assert!(result.is_err());
        assert_eq!(attempt_dirs(&f.work_root), 0);
    }

    #[tokio::test]
    async fn test_from_settings_builds_chain_in_order() {
        let f = fixture();
        let settings = SeparationSettings {
            providers: vec![ProviderKind::Silence, ProviderKind::Heuristic],
            ..Default::default()
        };
        let orch = SeparationOrchestrator::from_settings(
            &settings,
            reqwest::Client::new(),
            Arc::new(LocalStorage::default()),
            &f.work_root,
        );
        assert_eq!(orch.provider_names(), vec!["silence", "heuristic"]);

        let tracks = orch.separate(&f.source, None).await.unwrap();
        assert_eq!(std::fs::read(tracks.get(Stem::Vocals).unwrap()).unwrap(), b"song");
    }

    #[tokio::test]
    async fn test_tracks_remember_and_discard_their_dir() {
        let f = fixture();
        let orch = orchestrator(&f, vec![scripted("a", Script::Succeed)]);
        let keep = orch.separate(&f.source, None).await.unwrap();
        let gone = orch.separate(&f.source, None).await.unwrap();
        assert_eq!(attempt_dirs(&f.work_root), 2);
        assert_eq!(gone.work_dir().unwrap().parent().unwrap(), f.work_root);

        orch.discard(&gone).await;
        assert!(!gone.get(Stem::Vocals).unwrap().exists());
        assert!(keep.get(Stem::Vocals).unwrap().exists());
        assert_eq!(attempt_dirs(&f.work_root), 1);

        // Never deletes outside the work root
        let foreign = SeparatedTracks::new().with_work_dir(f.source.parent().unwrap().to_path_buf());
        orch.discard(&foreign).await;
        assert!(f.source.exists());

        orch.cleanup_work_dir().await.unwrap();
        assert!(!f.work_root.exists());
    }

    /// Fails its first call only, yielding between stems so calls interleave
    struct FailsOnce {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SeparationProvider for FailsOnce {
        fn name(&self) -> &'static str {
            "flaky"
        }

        fn tier(&self) -> ProviderTier {
            ProviderTier::Genuine
        }

        async fn separate(
            &self,
            request: &SeparationRequest<'_>,
            _progress: &ProgressSink,
        ) -> std::result::Result<SeparatedTracks, ProviderError> {
            let first = self.calls.fetch_add(1, AtomicOrdering::SeqCst) == 0;
            let mut tracks = SeparatedTracks::new();
            for stem in request.stems() {
                let path = request.stem_path(stem, "wav");
                std::fs::write(&path, stem.name()).unwrap();
                tracks.insert(stem, path);
                tokio::task::yield_now().await;
            }
            if first {
                return Err(ProviderError::Status {
                    status: 503,
                    message: "busy".to_string(),
                });
            }
            Ok(tracks)
        }
    }

    #[tokio::test]
    async fn test_concurrent_calls_keep_separate_dirs() {
        let f = fixture();
        let flaky: Arc<dyn SeparationProvider> = Arc::new(FailsOnce {
            calls: AtomicUsize::new(0),
        });
        let orch = orchestrator(&f, vec![flaky, scripted("backup", Script::Succeed)]);

        let (a, b) = futures_util::future::join(
            orch.separate(&f.source, None),
            orch.separate(&f.source, None),
        )
        .await;
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_ne!(a.work_dir(), b.work_dir());
        for stem in Stem::ALL {
            let (pa, pb) = (a.get(stem).unwrap(), b.get(stem).unwrap());
            assert_ne!(pa, pb);
            assert!(pa.exists(), "{:?} missing", pa);
            assert!(pb.exists(), "{:?} missing", pb);
        }

        // One call fell back after cleaning up its own "flaky" attempt only
        let winners: Vec<bool> = [&a, &b]
            .iter()
            .map(|t| t.get(Stem::Vocals).unwrap().to_string_lossy().contains("flaky"))
            .collect();
        assert_eq!(winners.iter().filter(|w| **w).count(), 1);
        assert_eq!(attempt_dirs(&f.work_root), 2);
    }
}
