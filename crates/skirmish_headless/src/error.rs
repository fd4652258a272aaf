//! Errors raised by the driver (the core has its own).

use std::path::PathBuf;

use skirmish_core::error::GameError;
use thiserror::Error;

/// Errors from file handling and match setup.
#[derive(Debug, Error)]
pub enum HeadlessError {
    /// Reading or writing a file failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The core refused the tuning or the match.
    #[error(transparent)]
    Game(#[from] GameError),

    /// JSON (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
