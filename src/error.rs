use reqwest::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

/// Why a single resource could not be saved.
///
/// These never abort a batch; each one ends up in the
/// [`DownloadOutcome`](crate::downloader::DownloadOutcome) of its URL.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("invalid URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: StatusCode },

    #[error("{action} {path:?}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("download task for {url} did not finish: {reason}")]
    Task { url: String, reason: String },
}

impl DownloadError {
    pub(crate) fn io(
        action: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        DownloadError::Io {
            action,
            path: path.into(),
            source,
        }
    }
}
