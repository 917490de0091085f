//! Placeholder provider: every stem is a copy of the source
//!
//! Nothing is separated. The copies exist so the stem mixer still works
//! (each fader controls a full mix) when every real provider is down.

use std::sync::Arc;

use async_trait::async_trait;

use super::error::ProviderError;
use super::progress::{ProgressSink, SeparationStage};
use super::provider::{ProviderTier, SeparationProvider, SeparationRequest};
use super::tracks::SeparatedTracks;
use crate::storage::FileStorage;

pub struct HeuristicProvider {
    storage: Arc<dyn FileStorage>,
}

impl HeuristicProvider {
    pub fn new(storage: Arc<dyn FileStorage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl SeparationProvider for HeuristicProvider {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn tier(&self) -> ProviderTier {
        ProviderTier::Degraded
    }

    async fn separate(
        &self,
        request: &SeparationRequest<'_>,
        progress: &ProgressSink,
    ) -> Result<SeparatedTracks, ProviderError> {
        progress.report(
            SeparationStage::Processing,
            50.0,
            "Creating stem tracks from the original audio...",
        );

        let extension = request.source_extension();
        let mut tracks = SeparatedTracks::new();
        for stem in request.stems() {
            let dest = request.stem_path(stem, &extension);
            self.storage.copy(request.source, &dest).await?;
            tracks.insert(stem, dest);
        }

        progress.report(SeparationStage::Processing, 90.0, "Stem tracks created");
        log::warn!("Using placeholder stems: every stem is the full mix");
        Ok(tracks)
    }
}
