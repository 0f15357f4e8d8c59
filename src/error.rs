use std::io;

use reqwest::StatusCode;
use thiserror::Error;

use crate::utils::multierr::MultiError;

/// Invalid command-line or programmatic configuration. Always fatal and
/// reported before any network activity.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("the --url option is mandatory")]
    MissingUrl,

    #[error("invalid server URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("the --threads option should have a numeric positive value")]
    InvalidThreads,

    #[error("the --split-count option cannot have a negative value (got {0})")]
    NegativeSplitCount(i64),

    #[error("invalid header {0:?}, expected \"Name: value\"")]
    InvalidHeader(String),

    #[error(transparent)]
    Query(#[from] QueryError),
}

/// Failure translating a user pattern or property filter into a search query.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid props pattern {props:?}: malformed entry {entry:?}")]
    MalformedProperty { props: String, entry: String },

    #[error("invalid props pattern {props:?}: duplicate key {key:?}")]
    DuplicateProperty { props: String, key: String },

    #[error("pattern {0:?} must be in the form <repository>/<path>")]
    MissingRepository(String),

    #[error("invalid regular expression: {0}")]
    Regex(#[from] regex::Error),
}

/// Failure of the search phase. Aborts the run before any artifact is
/// processed.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("search request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("malformed search response: {0}")]
    MalformedResponse(#[from] serde_json::Error),
}

/// Failure transferring a single artifact. Isolated to that artifact.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("server responded {status} for {url}")]
    Status { status: StatusCode, url: String },

    #[error("server did not report a usable Content-Length for {0}")]
    MissingContentLength(String),

    #[error("segment {segment} expected 206 Partial Content, got {status}")]
    RangeNotSatisfied { segment: usize, status: StatusCode },

    #[error("segment {segment} received {actual} bytes, expected {expected}")]
    SegmentLength {
        segment: usize,
        expected: u64,
        actual: u64,
    },

    #[error("segments {0}")]
    Segments(MultiError<TransferError>),

    #[error("file error: {0}")]
    Io(#[from] io::Error),

    #[error("transfer cancelled")]
    Cancelled,
}

/// Errors that terminate a download command.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("working directory error: {0}")]
    WorkDir(#[source] io::Error),
}
