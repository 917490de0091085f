//! Chord analysis error types

use std::path::PathBuf;
use thiserror::Error;

use crate::storage::StorageError;

/// Errors that can occur during chord analysis
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Unable to analyze {path}: audio could not be read")]
    Unresolvable {
        path: PathBuf,
        #[source]
        source: StorageError,
    },
}
