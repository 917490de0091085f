//! Separation configuration types

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::Stem;

/// Separation model requested from backends that support a choice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelType {
    #[default]
    Demucs,
    Spleeter,
    HtDemucs,
}

impl ModelType {
    /// Display name for UI
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Demucs => "Demucs",
            Self::Spleeter => "Spleeter",
            Self::HtDemucs => "Hybrid Transformer Demucs",
        }
    }
}

/// Requested separation quality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Low,
    Medium,
    #[default]
    High,
}

/// Options for a single separation call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeparationOptions {
    pub model: ModelType,
    pub quality: Quality,
    /// Stems to produce; an empty set requests every stem
    pub stems: BTreeSet<Stem>,
}

impl Default for SeparationOptions {
    fn default() -> Self {
        Self {
            model: ModelType::default(),
            quality: Quality::default(),
            stems: Stem::ALL.into_iter().collect(),
        }
    }
}

impl SeparationOptions {
    /// Options requesting only `stems`
    pub fn with_stems(stems: impl IntoIterator<Item = Stem>) -> Self {
        Self {
            stems: stems.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Stems providers must deliver, in mixer order
    pub fn requested_stems(&self) -> Vec<Stem> {
        if self.stems.is_empty() {
            Stem::ALL.to_vec()
        } else {
            self.stems.iter().copied().collect()
        }
    }
}

/// Provider implementations, in the order they may be listed in config
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Self-hosted separation backend
    Remote,
    /// Community-hosted two-stem API
    Community,
    /// Upload-then-poll vocal removal service
    Polling,
    /// Placeholder: every stem is a copy of the source
    Heuristic,
    /// Placeholder: vocals plus silent stems
    Silence,
}

impl ProviderKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Remote => "remote",
            Self::Community => "community",
            Self::Polling => "polling",
            Self::Heuristic => "heuristic",
            Self::Silence => "silence",
        }
    }
}

/// Self-hosted backend settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSettings {
    /// Backend root, e.g. "http://192.168.1.16:5000"
    pub base_url: String,
    /// Multipart field carrying the audio
    pub upload_field: String,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_string(),
            upload_field: "audio".to_string(),
        }
    }
}

/// Community API settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommunitySettings {
    pub endpoint: String,
}

impl Default for CommunitySettings {
    fn default() -> Self {
        Self {
            endpoint: "https://spleeter-api.herokuapp.com/separate".to_string(),
        }
    }
}

/// Job polling service settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingSettings {
    pub upload_url: String,
    /// Job status is fetched from `<status_url>/<job id>`
    pub status_url: String,
    pub poll_interval_ms: u64,
    pub max_attempts: u32,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            upload_url: "https://vocalremover.org/api/upload".to_string(),
            status_url: "https://vocalremover.org/api/status".to_string(),
            poll_interval_ms: 10_000,
            max_attempts: 30, // 5 minutes at the default interval
        }
    }
}

impl PollingSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Configuration for the separation pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeparationSettings {
    /// Providers in priority order
    pub providers: Vec<ProviderKind>,
    /// Root for per-call working directories; platform cache dir when unset
    pub work_dir: Option<PathBuf>,
    pub options: SeparationOptions,
    /// Per-request HTTP timeout
    pub http_timeout_secs: u64,
    pub remote: RemoteSettings,
    pub community: CommunitySettings,
    pub polling: PollingSettings,
}

impl Default for SeparationSettings {
    fn default() -> Self {
        Self {
            providers: vec![
                ProviderKind::Remote,
                ProviderKind::Community,
                ProviderKind::Polling,
                ProviderKind::Heuristic,
            ],
            work_dir: None,
            options: SeparationOptions::default(),
            http_timeout_secs: 300,
            remote: RemoteSettings::default(),
            community: CommunitySettings::default(),
            polling: PollingSettings::default(),
        }
    }
}

impl SeparationSettings {
    /// Validate configuration values
    pub fn validate(&mut self) {
        // Each provider is tried at most once per call
        let mut seen = Vec::with_capacity(self.providers.len());
        self.providers.retain(|kind| {
            if seen.contains(kind) {
                false
            } else {
                seen.push(*kind);
                true
            }
        });

        self.http_timeout_secs = self.http_timeout_secs.clamp(5, 3600);
        self.polling.poll_interval_ms = self.polling.poll_interval_ms.clamp(10, 600_000);
        self.polling.max_attempts = self.polling.max_attempts.clamp(1, 1000);
    }

    /// HTTP client shared by all network providers
    pub fn http_client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(self.http_timeout_secs))
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options_request_every_stem() {
        let options = SeparationOptions::default();
        assert_eq!(options.requested_stems(), Stem::ALL.to_vec());
        assert_eq!(SeparationOptions::with_stems([]).requested_stems().len(), 5);
    }

    #[test]
    fn test_requested_stems_in_mixer_order() {
        let options = SeparationOptions::with_stems([Stem::Other, Stem::Vocals]);
        assert_eq!(options.requested_stems(), vec![Stem::Vocals, Stem::Other]);
    }

    #[test]
    fn test_validate_dedupes_providers() {
        let mut settings = SeparationSettings {
            providers: vec![
                ProviderKind::Heuristic,
                ProviderKind::Remote,
                ProviderKind::Heuristic,
            ],
            http_timeout_secs: 0,
            ..Default::default()
        };
        settings.validate();
        assert_eq!(
            settings.providers,
            vec![ProviderKind::Heuristic, ProviderKind::Remote]
        );
        assert_eq!(settings.http_timeout_secs, 5);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let settings: SeparationSettings =
            serde_yaml::from_str("providers: [silence]\nremote:\n  upload_field: file\n").unwrap();
        assert_eq!(settings.providers, vec![ProviderKind::Silence]);
        assert_eq!(settings.remote.upload_field, "file");
        assert_eq!(settings.remote.base_url, "http://127.0.0.1:5000");
        assert_eq!(settings.polling.max_attempts, 30);
    }
}
