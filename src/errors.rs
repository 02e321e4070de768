//! Error types for the crawler.
//!
//! Per-URL problems ([`FetchError`], [`LinkRejection`]) are contained inside a
//! crawl task and never abort the job. [`SinkError`] is fatal: when the
//! output table can't be written the job stops and the error reaches the
//! caller through [`CrawlError`].

use reqwest::StatusCode;
use thiserror::Error;

/// Why a single page could not be fetched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("HTTP status {0}")]
    Http(StatusCode),

    #[error("could not decode response: {0}")]
    Decode(String),
}

impl FetchError {
    /// Short label used for failure counters in the crawl report.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Timeout => "timeout",
            FetchError::Connection(_) => "connection",
            FetchError::Http(_) => "http_status",
            FetchError::Decode(_) => "decode",
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = err.status() {
            FetchError::Http(status)
        } else if err.is_decode() || err.is_body() {
            FetchError::Decode(err.to_string())
        } else {
            FetchError::Connection(err.to_string())
        }
    }
}

/// A discovered link that the normaliser refused. Not an error condition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkRejection {
    #[error("malformed link")]
    Malformed,

    #[error("unsupported scheme {0}")]
    UnsupportedScheme(String),

    #[error("link leaves the outlet domain ({0})")]
    OffDomain(String),

    #[error("link points at a non-HTML resource")]
    NonHtml,
}

/// Failure to persist to the output table.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("output table I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("output table CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Fatal outcome of a crawl job.
#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("output table unwritable: {0}")]
    Sink(#[from] SinkError),

    #[error("crawl task panicked or was aborted: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("could not build HTTP client: {0}")]
    Client(String),
}

/// Problems loading or validating settings.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid setting: {0}")]
    Invalid(String),
}
