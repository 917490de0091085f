//! Community-hosted two-stem separation API
//!
//! Accepts a multipart upload (`file`, `stems=4`) and answers with
//! `vocals_url` and `accompaniment_url`. The service only splits vocals from
//! the backing track, so drums, bass and other all point at the
//! accompaniment.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::multipart::Form;
use serde::Deserialize;

use super::config::CommunitySettings;
use super::error::ProviderError;
use super::progress::{ProgressSink, SeparationStage};
use super::provider::{
    check_status, download_two_stem, http_error, upload_part, ProviderTier, SeparationProvider,
    SeparationRequest,
};
use super::tracks::SeparatedTracks;
use crate::storage::FileStorage;

#[derive(Deserialize)]
struct CommunityResponse {
    vocals_url: Option<String>,
    accompaniment_url: Option<String>,
}

pub struct CommunityApiProvider {
    client: reqwest::Client,
    storage: Arc<dyn FileStorage>,
    settings: CommunitySettings,
}

impl CommunityApiProvider {
    pub fn new(
        client: reqwest::Client,
        storage: Arc<dyn FileStorage>,
        settings: CommunitySettings,
    ) -> Self {
        Self {
            client,
            storage,
            settings,
        }
    }
}

#[async_trait]
impl SeparationProvider for CommunityApiProvider {
    fn name(&self) -> &'static str {
        "community"
    }

    fn tier(&self) -> ProviderTier {
        ProviderTier::Genuine
    }

    async fn separate(
        &self,
        request: &SeparationRequest<'_>,
        progress: &ProgressSink,
    ) -> Result<SeparatedTracks, ProviderError> {
        let url = self.settings.endpoint.as_str();

        progress.report(SeparationStage::Uploading, 10.0, "Preparing audio file...");
        let part = upload_part(self.storage.as_ref(), request.source, url).await?;
        let form = Form::new().part("file", part).text("stems", "4");

        progress.report(
            SeparationStage::Processing,
            30.0,
            "Using community Spleeter for separation...",
        );
        let response = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(http_error(url))?;
        let body: CommunityResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

        progress.report(SeparationStage::Processing, 70.0, "Separation finished");
        let (Some(vocals), Some(accompaniment)) = (body.vocals_url, body.accompaniment_url) else {
            return Err(ProviderError::MalformedResponse(
                "response is missing vocals_url or accompaniment_url".to_string(),
            ));
        };

        download_two_stem(
            self.storage.as_ref(),
            request,
            &vocals,
            &accompaniment,
            progress,
        )
        .await
    }
}
