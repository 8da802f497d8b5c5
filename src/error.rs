//! Error types for the library core.

use thiserror::Error;

/// Failures surfaced by the store and the import pipeline.
///
/// Everything here is recoverable: import failures leave the library
/// untouched, and stale-result `NotFound`s are swallowed at the call sites
/// that react to asynchronous completions.
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("unsupported format: {extension}")]
    UnsupportedFormat { extension: String },

    #[error("already in library: {path}")]
    DuplicateBook { path: String },

    #[error("no book with id {id}")]
    NotFound { id: String },

    #[error("import I/O error: {message}")]
    ImportIo { message: String },

    #[error("storage error: {message}")]
    Storage { message: String },
}

impl From<std::io::Error> for LibraryError {
    fn from(e: std::io::Error) -> Self {
        LibraryError::ImportIo {
            message: e.to_string(),
        }
    }
}

impl From<rusqlite::Error> for LibraryError {
    fn from(e: rusqlite::Error) -> Self {
        LibraryError::Storage {
            message: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for LibraryError {
    fn from(e: serde_json::Error) -> Self {
        LibraryError::Storage {
            message: e.to_string(),
        }
    }
}
