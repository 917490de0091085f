//! Audio stem separation
//!
//! Turns one audio file into per-stem files by trying a chain of providers
//! until one delivers every requested stem.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                SeparationOrchestrator                    │
//! │  • Tries providers in priority order                    │
//! │  • Keeps progress monotonic across fallbacks            │
//! │  • Validates results, cleans up working directories     │
//! └─────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │              SeparationProvider (trait)                  │
//! │  • separate() - one attempt inside a private directory  │
//! │  • tier() - genuine separation or placeholder           │
//! └─────────────────────────────────────────────────────────┘
//!                              │
//!      ┌──────────┬────────────┼────────────┬──────────┐
//!      ▼          ▼            ▼            ▼          ▼
//!   remote    community     polling     heuristic   silence
//!  (backend)  (2-stem API)  (job API)   (copies)    (stub)
//! ```

mod community;
mod config;
mod error;
mod heuristic;
mod orchestrator;
mod polling;
mod progress;
mod provider;
mod remote;
mod silence;
mod tracks;
mod workdir;

#[cfg(test)]
mod testing;

pub use community::CommunityApiProvider;
pub use config::{
    CommunitySettings, ModelType, PollingSettings, ProviderKind, Quality, RemoteSettings,
    SeparationOptions, SeparationSettings,
};
pub use error::{AllProvidersFailed, ProviderError, ProviderFailure, SeparationError};
pub use heuristic::HeuristicProvider;
pub use orchestrator::SeparationOrchestrator;
pub use polling::JobPollingProvider;
pub use progress::{
    progress_channel, ProgressCallback, ProgressSink, SeparationProgress, SeparationStage,
};
pub use provider::{ProviderTier, SeparationProvider, SeparationRequest};
pub use remote::RemoteBackendProvider;
pub use silence::{silent_wav, SilenceStubProvider};
pub use tracks::SeparatedTracks;
