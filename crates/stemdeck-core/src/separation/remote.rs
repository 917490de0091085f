//! Self-hosted separation backend
//!
//! Protocol:
//! - `GET /health` must succeed before anything is uploaded
//! - `POST /separate` (multipart, audio in the configured field) answers
//!   `{"tracks": {"vocals": id, "drums": id, "bass": id, "other": id,
//!   "accompaniment": id}}`
//! - `GET /download/<stem>/<id>` returns one stem file

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::multipart::Form;
use serde::Deserialize;

use super::config::RemoteSettings;
use super::error::ProviderError;
use super::progress::{ProgressSink, SeparationStage};
use super::provider::{
    check_status, download_stem, http_error, upload_part, ProviderTier, SeparationProvider,
    SeparationRequest,
};
use super::tracks::SeparatedTracks;
use crate::storage::FileStorage;

#[derive(Deserialize)]
struct SeparateResponse {
    tracks: Option<HashMap<String, String>>,
}

/// Provider backed by a self-hosted separation server
pub struct RemoteBackendProvider {
    client: reqwest::Client,
    storage: Arc<dyn FileStorage>,
    settings: RemoteSettings,
}

impl RemoteBackendProvider {
    pub fn new(
        client: reqwest::Client,
        storage: Arc<dyn FileStorage>,
        settings: RemoteSettings,
    ) -> Self {
        Self {
            client,
            storage,
            settings,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.settings.base_url.trim_end_matches('/'), path)
    }

    async fn check_health(&self) -> Result<(), ProviderError> {
        let url = self.url("/health");
        let unavailable = |reason: String| ProviderError::Unavailable {
            url: self.settings.base_url.clone(),
            reason,
        };

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(unavailable(format!(
                "health check returned {}",
                response.status().as_u16()
            )));
        }
        log::debug!("Separation backend at {} is healthy", self.settings.base_url);
        Ok(())
    }
}

#[async_trait]
impl SeparationProvider for RemoteBackendProvider {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn tier(&self) -> ProviderTier {
        ProviderTier::Genuine
    }

    async fn separate(
        &self,
        request: &SeparationRequest<'_>,
        progress: &ProgressSink,
    ) -> Result<SeparatedTracks, ProviderError> {
        self.check_health().await?;

        progress.report(
            SeparationStage::Uploading,
            10.0,
            "Uploading audio to separation backend...",
        );
        let url = self.url("/separate");
        let part = upload_part(self.storage.as_ref(), request.source, &url).await?;
        let form = Form::new().part(self.settings.upload_field.clone(), part);

        progress.report(
            SeparationStage::Uploading,
            30.0,
            "Sending to backend for processing...",
        );
        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(http_error(&url))?;
        let body: SeparateResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;
        let ids = body
            .tracks
            .ok_or_else(|| ProviderError::MalformedResponse("response has no tracks".to_string()))?;

        let stems = request.stems();
        let mut tracks = SeparatedTracks::new();
        for (i, stem) in stems.iter().copied().enumerate() {
            let id = ids
                .get(stem.backend_name())
                .ok_or(ProviderError::MissingStem(stem))?;

            progress.report(
                SeparationStage::Downloading,
                70.0 + (i as f32 / stems.len() as f32) * 25.0,
                format!("Downloading {} track...", stem),
            );
            let url = self.url(&format!("/download/{}/{}", stem.backend_name(), id));
            let dest = request.stem_path(stem, "wav");
            download_stem(self.storage.as_ref(), &url, &dest, stem).await?;
            tracks.insert(stem, dest);
        }

        progress.report(SeparationStage::Downloading, 95.0, "Downloaded all tracks");
        log::info!("Remote backend produced {} stems", tracks.len());
        Ok(tracks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::separation::config::SeparationOptions;
    use crate::separation::testing::FakeBackend;
    use crate::types::Stem;

    fn provider(backend: &FakeBackend, field: &str) -> RemoteBackendProvider {
        RemoteBackendProvider::new(
            backend.client(),
            backend.storage(),
            RemoteSettings {
                base_url: backend.base_url.clone(),
                upload_field: field.to_string(),
            },
        )
    }

    #[tokio::test]
    async fn test_separates_and_downloads_every_stem() {
        let backend = FakeBackend::start().await;
        let dir = tempfile::tempdir().unwrap();
        let source = backend.write_source(dir.path());
        let options = SeparationOptions::default();
        let request = SeparationRequest {
            source: &source,
            options: &options,
            work_dir: dir.path(),
        };

        let tracks = provider(&backend, "audio")
            .separate(&request, &ProgressSink::silent())
            .await
            .unwrap();

        assert_eq!(tracks.len(), 5);
        let instrumental = tracks.get(Stem::Instrumental).unwrap();
        assert_eq!(instrumental, dir.path().join("instrumental.wav"));
        // Instrumental is fetched under the backend's "accompaniment" name
        assert_eq!(std::fs::read(instrumental).unwrap(), b"stem:accompaniment:id-accompaniment");
        assert_eq!(backend.state.upload_fields(), vec!["audio".to_string()]);
    }

    #[tokio::test]
    async fn test_configurable_upload_field() {
        let backend = FakeBackend::start().await;
        let dir = tempfile::tempdir().unwrap();
        let source = backend.write_source(dir.path());
        let options = SeparationOptions::with_stems([Stem::Vocals]);
        let request = SeparationRequest {
            source: &source,
            options: &options,
            work_dir: dir.path(),
        };

        provider(&backend, "file")
            .separate(&request, &ProgressSink::silent())
            .await
            .unwrap();
        assert_eq!(backend.state.upload_fields(), vec!["file".to_string()]);
    }

    #[tokio::test]
    async fn test_unhealthy_backend_fails_without_upload() {
        let backend = FakeBackend::start().await;
        backend.state.set_healthy(false);
        let dir = tempfile::tempdir().unwrap();
        let source = backend.write_source(dir.path());
        let options = SeparationOptions::default();
        let request = SeparationRequest {
            source: &source,
            options: &options,
            work_dir: dir.path(),
        };

        let err = provider(&backend, "audio")
            .separate(&request, &ProgressSink::silent())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Unavailable { .. }));
        assert!(backend.state.upload_fields().is_empty());
    }

    #[tokio::test]
    async fn test_backend_error_message_is_kept() {
        let backend = FakeBackend::start().await;
        backend.state.set_separate_status(500);
        let dir = tempfile::tempdir().unwrap();
        let source = backend.write_source(dir.path());
        let options = SeparationOptions::default();
        let request = SeparationRequest {
            source: &source,
            options: &options,
            work_dir: dir.path(),
        };

        let err = provider(&backend, "audio")
            .separate(&request, &ProgressSink::silent())
            .await
            .unwrap_err();
        match err {
            ProviderError::Status { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "model crashed");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_track_entry_fails() {
        let backend = FakeBackend::start().await;
        backend.state.omit_track("drums");
        let dir = tempfile::tempdir().unwrap();
        let source = backend.write_source(dir.path());
        let options = SeparationOptions::default();
        let request = SeparationRequest {
            source: &source,
            options: &options,
            work_dir: dir.path(),
        };

        let err = provider(&backend, "audio")
            .separate(&request, &ProgressSink::silent())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::MissingStem(Stem::Drums)));
    }

    #[tokio::test]
    async fn test_failed_download_fails() {
        let backend = FakeBackend::start().await;
        backend.state.fail_download("bass");
        let dir = tempfile::tempdir().unwrap();
        let source = backend.write_source(dir.path());
        let options = SeparationOptions::default();
        let request = SeparationRequest {
            source: &source,
            options: &options,
            work_dir: dir.path(),
        };

        let err = provider(&backend, "audio")
            .separate(&request, &ProgressSink::silent())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProviderError::Download {
                stem: Stem::Bass,
                status: 404
            }
        ));
    }
}
