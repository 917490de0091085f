//! Placeholder provider: vocals plus silent stems
//!
//! The vocals stem is the untouched source and every other stem is one
//! second of silence, so soloing "vocals" plays the song and the other
//! faders do nothing audible.

use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use hound::{SampleFormat, WavSpec, WavWriter};

use super::error::ProviderError;
use super::progress::{ProgressSink, SeparationStage};
use super::provider::{ProviderTier, SeparationProvider, SeparationRequest};
use super::tracks::SeparatedTracks;
use crate::storage::FileStorage;
use crate::types::Stem;

const SILENCE_SAMPLE_RATE: u32 = 44_100;

/// One second of 16-bit mono silence as a WAV file
pub fn silent_wav() -> Result<Vec<u8>, hound::Error> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: SILENCE_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    let mut writer = WavWriter::new(&mut cursor, spec)?;
    for _ in 0..SILENCE_SAMPLE_RATE {
        writer.write_sample(0i16)?;
    }
    writer.finalize()?;
    Ok(cursor.into_inner())
}

pub struct SilenceStubProvider {
    storage: Arc<dyn FileStorage>,
}

impl SilenceStubProvider {
    pub fn new(storage: Arc<dyn FileStorage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl SeparationProvider for SilenceStubProvider {
    fn name(&self) -> &'static str {
        "silence"
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
            30.0,
            "Processing audio for vocal separation...",
        );

        let stems = request.stems();
        let mut tracks = SeparatedTracks::new();
        if stems.contains(&Stem::Vocals) {
            let dest = request.stem_path(Stem::Vocals, &request.source_extension());
            self.storage.copy(request.source, &dest).await?;
            tracks.insert(Stem::Vocals, dest);
        }

        progress.report(
            SeparationStage::Processing,
            80.0,
            "Generating instrumental tracks...",
        );
        let silence = silent_wav()?;
        for stem in stems.into_iter().filter(|s| *s != Stem::Vocals) {
            let dest = request.stem_path(stem, "wav");
            self.storage.write(&dest, &silence).await?;
            tracks.insert(stem, dest);
        }

        log::warn!("Using placeholder stems: vocals = original, others = silence");
        Ok(tracks)
    }
}
