use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("Invalid input {path}: {reason}")]
    InvalidInput { path: PathBuf, reason: String },
    #[error("I/O failure on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error(
        "Too many failed lookups ({unlisted}/{processed} unlisted, {success_rate:.1}% success), there may be something wrong with the API calls"
    )]
    TooManyFailures {
        processed: usize,
        unlisted: usize,
        success_rate: f64,
    },
}

impl EnrichError {
    pub fn invalid_input(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        EnrichError::InvalidInput {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EnrichError>;
