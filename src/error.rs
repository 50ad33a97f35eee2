use thiserror::Error;

/// Why a single page could not be fetched
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("timed out fetching {url}")]
    Timeout { url: String },
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("network error fetching {url}: {message}")]
    Network { url: String, message: String },
    #[error("failed to read body of {url}: {message}")]
    Body { url: String, message: String },
}

/// Failures that abort a whole scrape run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("unknown source '{0}'")]
    UnknownSource(String),
    #[error("scrape run cancelled")]
    Cancelled,
}
