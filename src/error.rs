//! Error types for NDJSON melting

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// One NDJSON line could not be parsed. The run continues past it.
    #[error("line {line}: malformed JSON: {message}")]
    Parse { line: usize, message: String },

    #[error("failed to open input {path}: {source}")]
    Input {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl Error {
    /// Whether the run can continue after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Parse { .. })
    }
}
