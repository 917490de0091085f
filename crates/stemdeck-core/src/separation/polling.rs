//! Upload-then-poll separation service
//!
//! The upload answers with a job id; `GET <status_url>/<id>` is polled until
//! the job reports `completed` (with `vocals_url` and `instrumental_url`) or
//! `failed`, or the attempt budget runs out.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::multipart::Form;
use serde::Deserialize;

use super::config::PollingSettings;
use super::error::ProviderError;
use super::progress::{ProgressSink, SeparationStage};
use super::provider::{
    check_status, download_two_stem, http_error, upload_part, ProviderTier, SeparationProvider,
    SeparationRequest,
};
use super::tracks::SeparatedTracks;
use crate::storage::FileStorage;

#[derive(Deserialize)]
struct JobStatus {
    status: String,
    vocals_url: Option<String>,
    instrumental_url: Option<String>,
}

pub struct JobPollingProvider {
    client: reqwest::Client,
    storage: Arc<dyn FileStorage>,
    settings: PollingSettings,
}

impl JobPollingProvider {
    pub fn new(
        client: reqwest::Client,
        storage: Arc<dyn FileStorage>,
        settings: PollingSettings,
    ) -> Self {
        Self {
            client,
            storage,
            settings,
        }
    }

    async fn submit(&self, request: &SeparationRequest<'_>) -> Result<String, ProviderError> {
        let url = self.settings.upload_url.as_str();
        let part = upload_part(self.storage.as_ref(), request.source, url).await?;
        let response = self
            .client
            .post(url)
            .header(ACCEPT, "application/json")
            .multipart(Form::new().part("file", part))
            .send()
            .await
            .map_err(http_error(url))?;
        let body: serde_json::Value = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

        match body.get("id") {
            Some(serde_json::Value::String(id)) => Ok(id.clone()),
            Some(serde_json::Value::Number(id)) => Ok(id.to_string()),
            _ => Err(ProviderError::MalformedResponse(
                "upload response has no job id".to_string(),
            )),
        }
    }

    async fn poll(&self, id: &str) -> Result<JobStatus, ProviderError> {
        let url = format!("{}/{}", self.settings.status_url.trim_end_matches('/'), id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(http_error(&url))?;
        check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))
    }
}

#[async_trait]
impl SeparationProvider for JobPollingProvider {
    fn name(&self) -> &'static str {
        "polling"
    }

    fn tier(&self) -> ProviderTier {
        ProviderTier::Genuine
    }

    async fn separate(
        &self,
        request: &SeparationRequest<'_>,
        progress: &ProgressSink,
    ) -> Result<SeparatedTracks, ProviderError> {
        progress.report(
            SeparationStage::Uploading,
            40.0,
            "Uploading to vocal removal service...",
        );
        let id = self.submit(request).await?;
        log::info!("Vocal removal job {} submitted", id);

        let max = self.settings.max_attempts;
        for attempt in 1..=max {
            tokio::time::sleep(self.settings.poll_interval()).await;

            let status = self.poll(&id).await?;
            match (status.status.as_str(), status.vocals_url, status.instrumental_url) {
                ("completed", Some(vocals), Some(instrumental)) => {
                    return download_two_stem(
                        self.storage.as_ref(),
                        request,
                        &vocals,
                        &instrumental,
                        progress,
                    )
                    .await;
                }
                ("failed", _, _) => return Err(ProviderError::JobFailed(id)),
                _ => {}
            }

            progress.report(
                SeparationStage::Processing,
                50.0 + (attempt as f32 / max as f32) * 30.0,
                format!("Processing... ({}/{})", attempt, max),
            );
        }

        Err(ProviderError::Timeout { attempts: max })
    }
}
