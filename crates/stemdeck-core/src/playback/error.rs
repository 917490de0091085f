//! Playback error types

use thiserror::Error;

use crate::transport::TransportError;
use crate::types::Stem;

/// Errors from the playback coordinator
#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("Failed to {op} {stem} stem")]
    Transport {
        op: &'static str,
        stem: Stem,
        #[source]
        source: TransportError,
    },

    #[error("Failed to load {stem} stem")]
    Load {
        stem: Stem,
        #[source]
        source: TransportError,
    },

    #[error("Stem {0} is not loaded")]
    UnknownStem(Stem),

    #[error("No stems loaded")]
    NothingLoaded,
}

pub type Result<T> = std::result::Result<T, PlaybackError>;
