use std::io;
use std::path::Path;

use crate::checksum::{LocalFileMetadata, local_file_details};
use crate::downloader::probe::RemoteFileMetadata;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchReason {
    Missing,
    ChecksumMismatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Fetch(FetchReason),
    Skip,
}

fn digest_matches(local: &str, remote: Option<&str>) -> bool {
    remote.is_some_and(|remote| remote.eq_ignore_ascii_case(local))
}

/// Skip only when both digests are known remotely and equal the local ones.
pub fn decide(local: Option<&LocalFileMetadata>, remote: &RemoteFileMetadata) -> Decision {
    match local {
        None => Decision::Fetch(FetchReason::Missing),
        Some(local)
            if digest_matches(&local.md5, remote.md5.as_deref())
                && digest_matches(&local.sha1, remote.sha1.as_deref()) =>
        {
            Decision::Skip
        }
        Some(_) => Decision::Fetch(FetchReason::ChecksumMismatch),
    }
}

/// Hashes `dest` only if a regular file is already there.
pub async fn assess(dest: &Path, remote: &RemoteFileMetadata) -> io::Result<Decision> {
    let exists = match tokio::fs::metadata(dest).await {
        Ok(metadata) => metadata.is_file(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => false,
        Err(err) => return Err(err),
    };
    if !exists {
        return Ok(decide(None, remote));
    }
    let local = local_file_details(dest.to_path_buf()).await?;
    Ok(decide(Some(&local), remote))
}
