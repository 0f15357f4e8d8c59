use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use sha1::{Digest, Sha1};
use tracing::debug;

const BUFFER_SIZE: usize = 64 * 1024;

/// Digests of a file that already exists at a destination path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFileMetadata {
    pub size: u64,
    /// Lowercase hex.
    pub md5: String,
    /// Lowercase hex.
    pub sha1: String,
}

/// Reads the file once, feeding both digests from the same buffer.
pub fn file_details(path: &Path) -> io::Result<LocalFileMetadata> {
    let begin = Instant::now();
    let mut file = File::open(path)?;
    let mut buffer = vec![0; BUFFER_SIZE];
    let mut md5_ctx = md5::Context::new();
    let mut sha1 = Sha1::new();
    let mut size = 0u64;
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        md5_ctx.consume(&buffer[..n]);
        sha1.update(&buffer[..n]);
        size += n as u64;
    }

    let elapsed = begin.elapsed();
    if elapsed > Duration::from_millis(100) {
        debug!(
            "checksum of {} took {:.2} seconds",
            path.display(),
            elapsed.as_secs_f64()
        );
    }

    Ok(LocalFileMetadata {
        size,
        md5: format!("{:x}", md5_ctx.compute()),
        sha1: format!("{:x}", sha1.finalize()),
    })
}

/// [`file_details`] on the blocking pool.
pub async fn local_file_details(path: PathBuf) -> io::Result<LocalFileMetadata> {
    tokio::task::spawn_blocking(move || file_details(&path))
        .await
        .map_err(io::Error::other)?
}
