//! Separation error types

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use super::progress::SeparationStage;
use crate::storage::StorageError;
use crate::types::Stem;

/// Errors reported by a single provider
///
/// These never reach the caller directly: the orchestrator records them and
/// moves on to the next provider.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Cannot connect to separation backend at {url}: {reason}")]
    Unavailable { url: String, reason: String },

    #[error("Request to {url} failed")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{message} (HTTP {status})")]
    Status { status: u16, message: String },

    #[error("Unexpected response: {0}")]
    MalformedResponse(String),

    #[error("No usable {0} track")]
    MissingStem(Stem),

    #[error("Failed to download {stem} track (HTTP {status})")]
    Download { stem: Stem, status: u16 },

    #[error("Separation job {0} failed")]
    JobFailed(String),

    #[error("Separation job still running after {attempts} status checks")]
    Timeout { attempts: u32 },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Failed to encode placeholder audio")]
    Encode(#[from] hound::Error),
}

/// One failed provider attempt
#[derive(Debug)]
pub struct ProviderFailure {
    pub provider: &'static str,
    /// Last stage the provider reported before failing
    pub stage: SeparationStage,
    pub error: ProviderError,
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.provider, self.stage, self.error)?;
        // Underlying causes (refused connections, DNS, I/O) live in the chain
        let mut cause = std::error::Error::source(&self.error);
        while let Some(err) = cause {
            write!(f, ": {}", err)?;
            cause = err.source();
        }
        Ok(())
    }
}

/// Every configured provider failed
#[derive(Debug)]
pub struct AllProvidersFailed {
    /// Attempts in the order they ran
    pub failures: Vec<ProviderFailure>,
}

impl AllProvidersFailed {
    /// Failure of the last provider tried
    pub fn last(&self) -> Option<&ProviderFailure> {
        self.failures.last()
    }
}

impl fmt::Display for AllProvidersFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "All separation providers failed")?;
        if let Some((last, earlier)) = self.failures.split_last() {
            write!(f, ". Last error from {}", last)?;
            if !earlier.is_empty() {
                let summary: Vec<String> = earlier.iter().map(|e| e.to_string()).collect();
                write!(f, ". Earlier: {}", summary.join("; "))?;
            }
        }
        write!(
            f,
            ". Check your internet connection or make sure the separation backend is running."
        )
    }
}

impl std::error::Error for AllProvidersFailed {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.last()
            .map(|f| &f.error as &(dyn std::error::Error + 'static))
    }
}

/// Errors returned by [`SeparationOrchestrator::separate`](super::SeparationOrchestrator::separate)
#[derive(Error, Debug)]
pub enum SeparationError {
    #[error("No separation providers configured")]
    NoProviders,

    #[error("Audio file not found: {0}")]
    SourceMissing(PathBuf),

    #[error("Failed to prepare working directory")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    AllProvidersFailed(#[from] AllProvidersFailed),
}

pub type Result<T> = std::result::Result<T, SeparationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_failed_names_last_cause_and_summarises_earlier() {
        let err = AllProvidersFailed {
            failures: vec![
                ProviderFailure {
                    provider: "remote",
                    stage: SeparationStage::Uploading,
                    error: ProviderError::Unavailable {
                        url: "http://127.0.0.1:5000".to_string(),
                        reason: "connection refused".to_string(),
                    },
                },
                ProviderFailure {
                    provider: "polling",
                    stage: SeparationStage::Processing,
                    error: ProviderError::Timeout { attempts: 30 },
                },
            ],
        };
        let text = err.to_string();
        assert!(text.contains("Last error from polling (processing)"));
        assert!(text.contains("30 status checks"));
        assert!(text.contains("Earlier: remote (uploading)"));
        assert!(text.contains("internet connection"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_failure_display_includes_causes() {
        let failure = ProviderFailure {
            provider: "heuristic",
            stage: SeparationStage::Processing,
            error: ProviderError::Storage(StorageError::Io {
                op: "copy",
                path: PathBuf::from("/music/song.mp3"),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "permission denied"),
            }),
        };
        assert_eq!(
            failure.to_string(),
            "heuristic (processing): Failed to copy /music/song.mp3: permission denied"
        );
    }

    #[tokio::test]
    async fn test_http_cause_reaches_summary() {
        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        let url = "http://127.0.0.1:1/health";
        let source = client.get(url).send().await.unwrap_err();
        let err = AllProvidersFailed {
            failures: vec![
                ProviderFailure {
                    provider: "remote",
                    stage: SeparationStage::Uploading,
                    error: ProviderError::Http {
                        url: url.to_string(),
                        source,
                    },
                },
                ProviderFailure {
                    provider: "polling",
                    stage: SeparationStage::Uploading,
                    error: ProviderError::JobFailed("7".to_string()),
                },
            ],
        };
        let text = err.to_string();
        assert!(text.contains("Earlier: remote (uploading): Request to http://127.0.0.1:1/health failed: "));
    }
}
