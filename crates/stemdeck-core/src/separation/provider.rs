//! Separation provider trait and shared helpers
//!
//! A provider turns one source file into local stem files inside the working
//! directory it is given. Providers are tried in priority order by the
//! orchestrator; any error simply moves on to the next one.
//!
//! ## Implementing a New Provider
//!
//! ```ignore
//! struct MyProvider;
//!
//! #[async_trait]
//! impl SeparationProvider for MyProvider {
//!     fn name(&self) -> &'static str { "mine" }
//!     fn tier(&self) -> ProviderTier { ProviderTier::Genuine }
//!     async fn separate(&self, request: &SeparationRequest<'_>,
//!                       progress: &ProgressSink) -> Result<SeparatedTracks, ProviderError> {
//!         // 1. Send request.source somewhere
//!         // 2. Write each of request.stems() under request.work_dir
//!         // 3. Return the paths
//!     }
//! }
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reqwest::multipart::Part;
use serde::Deserialize;

use super::config::SeparationOptions;
use super::error::ProviderError;
use super::progress::{ProgressSink, SeparationStage};
use super::tracks::SeparatedTracks;
use crate::storage::FileStorage;
use crate::types::Stem;

/// Whether a provider really separates audio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderTier {
    /// Produces actual stems
    Genuine,
    /// Produces placeholder files so the player stays usable
    Degraded,
}

/// Input for one provider attempt
#[derive(Debug, Clone, Copy)]
pub struct SeparationRequest<'a> {
    pub source: &'a Path,
    pub options: &'a SeparationOptions,
    /// Private directory for this attempt; providers write nowhere else
    pub work_dir: &'a Path,
}

impl SeparationRequest<'_> {
    /// Stems the provider must deliver
    pub fn stems(&self) -> Vec<Stem> {
        self.options.requested_stems()
    }

    /// `<work_dir>/<stem>.<extension>`
    pub fn stem_path(&self, stem: Stem, extension: &str) -> PathBuf {
        self.work_dir.join(format!("{}.{}", stem.name(), extension))
    }

    /// Extension of the source file, "wav" if it has none
    pub fn source_extension(&self) -> String {
        self.source
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_else(|| "wav".to_string())
    }
}

/// Trait for stem separation providers
#[async_trait]
pub trait SeparationProvider: Send + Sync {
    /// Short name used in progress messages and errors
    fn name(&self) -> &'static str;

    fn tier(&self) -> ProviderTier;

    /// Separate `request.source`, returning every requested stem or an error
    async fn separate(
        &self,
        request: &SeparationRequest<'_>,
        progress: &ProgressSink,
    ) -> Result<SeparatedTracks, ProviderError>;
}

/// MIME type for an audio file, by extension
pub(crate) fn audio_mime(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("flac") => "audio/flac",
        Some("m4a") | Some("mp4") => "audio/mp4",
        Some("ogg") => "audio/ogg",
        Some("aac") => "audio/aac",
        _ => "application/octet-stream",
    }
}

/// Multipart part carrying the source audio, bound for `url`
pub(crate) async fn upload_part(
    storage: &dyn FileStorage,
    source: &Path,
    url: &str,
) -> Result<Part, ProviderError> {
    let bytes = storage.read(source).await?;
    let file_name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "audio".to_string());
    log::debug!("Uploading {} ({} bytes) to {}", file_name, bytes.len(), url);

    Part::bytes(bytes)
        .file_name(file_name)
        .mime_str(audio_mime(source))
        .map_err(|source| ProviderError::Http {
            url: url.to_string(),
            source,
        })
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

/// Turn a non-success response into [`ProviderError::Status`]
///
/// Uses the backend's `{"error": ...}` message when it sends one.
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|b| b.error)
        .unwrap_or_else(|| format!("Backend error: {}", status.as_u16()));
    Err(ProviderError::Status {
        status: status.as_u16(),
        message,
    })
}

/// Wrap a transport-level reqwest failure
pub(crate) fn http_error(url: &str) -> impl Fn(reqwest::Error) -> ProviderError + '_ {
    move |source| ProviderError::Http {
        url: url.to_string(),
        source,
    }
}

/// Download one stem file, failing on any status but 200
pub(crate) async fn download_stem(
    storage: &dyn FileStorage,
    url: &str,
    dest: &Path,
    stem: Stem,
) -> Result<(), ProviderError> {
    let status = storage.download(url, dest).await?;
    if status != 200 {
        return Err(ProviderError::Download { stem, status });
    }
    Ok(())
}

/// File extension in the last path segment of a URL, "wav" if absent
pub(crate) fn url_extension(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/')
        .next()
        .and_then(|segment| segment.rsplit_once('.'))
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or("wav")
}

/// Materialize a vocals/backing split
///
/// Services that only split in two return a vocals file and one backing
/// file; every non-vocal stem is addressed to the backing file.
pub(crate) async fn download_two_stem(
    storage: &dyn FileStorage,
    request: &SeparationRequest<'_>,
    vocals_url: &str,
    backing_url: &str,
    progress: &ProgressSink,
) -> Result<SeparatedTracks, ProviderError> {
    let stems = request.stems();
    let mut tracks = SeparatedTracks::new();

    if stems.contains(&Stem::Vocals) {
        progress.report(SeparationStage::Downloading, 80.0, "Downloading vocals track...");
        let dest = request.stem_path(Stem::Vocals, url_extension(vocals_url));
        download_stem(storage, vocals_url, &dest, Stem::Vocals).await?;
        tracks.insert(Stem::Vocals, dest);
    }

    let backing: Vec<Stem> = stems.into_iter().filter(|s| *s != Stem::Vocals).collect();
    if !backing.is_empty() {
        progress.report(SeparationStage::Downloading, 90.0, "Downloading instrumental track...");
        let dest = request.stem_path(Stem::Instrumental, url_extension(backing_url));
        download_stem(storage, backing_url, &dest, Stem::Instrumental).await?;
        for stem in backing {
            tracks.insert(stem, dest.clone());
        }
    }

    Ok(tracks)
}
