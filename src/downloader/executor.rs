use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};

use futures::StreamExt;
use futures::future::join_all;
use reqwest::StatusCode;
use reqwest::header::RANGE;
use tempfile::NamedTempFile;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::info;

use crate::downloader::planer::{ByteRange, TransferPlan};
use crate::error::TransferError;
use crate::session::Session;
use crate::utils::multierr::MultiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferReport {
    pub status: StatusCode,
    pub bytes: u64,
    pub segments: usize,
}

/// Write capability over one segment's byte window of the staging file. Each
/// segment opens its own handle, and windows never overlap.
struct SegmentSink {
    segment: usize,
    range: ByteRange,
    file: File,
    written: u64,
}

impl SegmentSink {
    async fn open(path: &Path, segment: usize, range: ByteRange) -> io::Result<Self> {
        let mut file = OpenOptions::new().write(true).open(path).await?;
        file.seek(SeekFrom::Start(range.start)).await?;
        Ok(SegmentSink {
            segment,
            range,
            file,
            written: 0,
        })
    }

    async fn write(&mut self, chunk: &[u8]) -> Result<(), TransferError> {
        let written = self.written + chunk.len() as u64;
        if written > self.range.len() {
            return Err(TransferError::SegmentLength {
                segment: self.segment,
                expected: self.range.len(),
                actual: written,
            });
        }
        self.file.write_all(chunk).await?;
        self.written = written;
        Ok(())
    }

    async fn finish(mut self) -> Result<u64, TransferError> {
        if self.written != self.range.len() {
            return Err(TransferError::SegmentLength {
                segment: self.segment,
                expected: self.range.len(),
                actual: self.written,
            });
        }
        self.file.flush().await?;
        self.file.sync_all().await?;
        Ok(self.written)
    }
}

/// Moves a fully transferred staging file onto its destination. Falls back to
/// copying when the rename crosses filesystems.
async fn persist(staging: NamedTempFile, dest: &Path) -> io::Result<()> {
    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || match staging.persist(&dest) {
        Ok(_) => Ok(()),
        Err(err) => std::fs::copy(err.file.path(), &dest).map(|_| ()),
    })
    .await
    .map_err(io::Error::other)?
}

/// Fetches one artifact according to its [`TransferPlan`]. Bytes are staged
/// under `staging_dir` and only reach the destination once every part of the
/// plan has succeeded; a failed transfer leaves nothing behind.
pub struct TransferExecutor<'a> {
    session: &'a Session,
    staging_dir: PathBuf,
}

impl<'a> TransferExecutor<'a> {
    pub fn new(session: &'a Session, staging_dir: impl Into<PathBuf>) -> Self {
        TransferExecutor {
            session,
            staging_dir: staging_dir.into(),
        }
    }

    pub async fn execute(
        &self,
        url: &str,
        dest: &Path,
        plan: &TransferPlan,
    ) -> Result<TransferReport, TransferError> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        let staging = NamedTempFile::new_in(&self.staging_dir)?;

        let report = match plan {
            TransferPlan::Whole => self.fetch_whole(url, staging.path()).await?,
            TransferPlan::Split(ranges) => self.fetch_split(url, staging.path(), ranges).await?,
        };

        persist(staging, dest).await?;
        Ok(report)
    }

    async fn fetch_whole(&self, url: &str, path: &Path) -> Result<TransferReport, TransferError> {
        let response = self.session.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransferError::Status {
                status,
                url: url.to_string(),
            });
        }

        let mut file = File::create(path).await?;
        let mut stream = response.bytes_stream();
        let mut bytes = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            bytes += chunk.len() as u64;
        }
        file.flush().await?;
        file.sync_all().await?;

        Ok(TransferReport {
            status,
            bytes,
            segments: 1,
        })
    }

    async fn fetch_split(
        &self,
        url: &str,
        path: &Path,
        ranges: &[ByteRange],
    ) -> Result<TransferReport, TransferError> {
        let total = ranges.last().map_or(0, |range| range.end + 1);
        OpenOptions::new()
            .write(true)
            .open(path)
            .await?
            .set_len(total)
            .await?;

        let fetches = ranges
            .iter()
            .enumerate()
            .map(|(segment, range)| self.fetch_segment(url, path, segment, *range));
        let results = join_all(fetches).await;

        let failures: MultiError<TransferError> = results
            .into_iter()
            .enumerate()
            .filter_map(|(segment, result)| result.err().map(|err| (segment, err)))
            .collect();
        failures.into_result().map_err(TransferError::Segments)?;

        Ok(TransferReport {
            status: StatusCode::PARTIAL_CONTENT,
            bytes: total,
            segments: ranges.len(),
        })
    }

    async fn fetch_segment(
        &self,
        url: &str,
        path: &Path,
        segment: usize,
        range: ByteRange,
    ) -> Result<u64, TransferError> {
        let response = self
            .session
            .get(url)
            .header(RANGE, range.header_value())
            .send()
            .await?;
        let status = response.status();
        info!("[{}]: Artifactory response: {}", segment, status);
        if status != StatusCode::PARTIAL_CONTENT {
            return Err(TransferError::RangeNotSatisfied { segment, status });
        }

        let mut sink = SegmentSink::open(path, segment, range).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            sink.write(&chunk?).await?;
        }
        sink.finish().await
    }
}
