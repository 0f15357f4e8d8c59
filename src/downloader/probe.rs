use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, HeaderMap};

use crate::error::TransferError;
use crate::session::Session;

/// Remote size and digests, fetched right before the transfer decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFileMetadata {
    pub size: u64,
    pub md5: Option<String>,
    pub sha1: Option<String>,
    pub accepts_ranges: bool,
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl RemoteFileMetadata {
    pub fn from_headers(url: &str, headers: &HeaderMap) -> Result<Self, TransferError> {
        let size = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| TransferError::MissingContentLength(url.to_string()))?;

        let accepts_ranges = headers
            .get(ACCEPT_RANGES)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("bytes"));

        Ok(RemoteFileMetadata {
            size,
            md5: header_str(headers, "x-checksum-md5"),
            sha1: header_str(headers, "x-checksum-sha1"),
            accepts_ranges,
        })
    }
}

/// HEAD request against the artifact's download URL.
pub async fn probe(session: &Session, url: &str) -> Result<RemoteFileMetadata, TransferError> {
    let response = session.head(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(TransferError::Status {
            status,
            url: url.to_string(),
        });
    }
    RemoteFileMetadata::from_headers(url, response.headers())
}
