use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span};

use crate::catalog::ArtifactDescriptor;
use crate::config::TransferConfig;
use crate::downloader::executor::TransferExecutor;
use crate::downloader::planer::RangePlanner;
use crate::downloader::probe;
use crate::downloader::staleness::{self, Decision};
use crate::error::TransferError;
use crate::session::Session;

/// Indices owned by `worker_id`: `worker_id, worker_id + workers, ...`.
pub fn stripe(len: usize, workers: usize, worker_id: usize) -> impl Iterator<Item = usize> {
    debug_assert!(workers > 0);
    (worker_id..len).step_by(workers.max(1))
}

#[derive(Debug, Default)]
struct TransferStats {
    downloaded: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
    planned: AtomicUsize,
}

impl TransferStats {
    fn summary(&self) -> TransferSummary {
        TransferSummary {
            downloaded: self.downloaded.load(Ordering::SeqCst),
            skipped: self.skipped.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            planned: self.planned.load(Ordering::SeqCst),
        }
    }
}

/// Aggregate result of one dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferSummary {
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Artifacts only logged because of a dry run.
    pub planned: usize,
}

impl TransferSummary {
    pub fn succeeded(&self) -> usize {
        self.downloaded + self.skipped + self.planned
    }
}

#[derive(Debug)]
enum Outcome {
    Downloaded,
    Skipped,
}

struct Worker {
    session: Session,
    config: Arc<TransferConfig>,
    planner: RangePlanner,
    staging_dir: Option<PathBuf>,
    stats: TransferStats,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(&self, worker_id: usize, artifacts: &[ArtifactDescriptor]) {
        for index in stripe(artifacts.len(), self.config.threads, worker_id) {
            let artifact = &artifacts[index];
            let url = artifact.download_url(self.session.base_url());
            let dest = artifact.local_path(&self.config.target_dir, self.config.flat);
            info!("Downloading {}", url);

            if self.config.dry_run {
                self.stats.planned.fetch_add(1, Ordering::SeqCst);
                continue;
            }

            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Err(TransferError::Cancelled),
                result = self.transfer(&url, &dest) => result,
            };
            match result {
                Ok(Outcome::Downloaded) => {
                    self.stats.downloaded.fetch_add(1, Ordering::SeqCst);
                }
                Ok(Outcome::Skipped) => {
                    self.stats.skipped.fetch_add(1, Ordering::SeqCst);
                }
                Err(err) => {
                    error!("Failed to download {}: {}", artifact, err);
                    self.stats.failed.fetch_add(1, Ordering::SeqCst);
                }
            }
        }
    }

    async fn transfer(&self, url: &str, dest: &Path) -> Result<Outcome, TransferError> {
        let remote = probe::probe(&self.session, url).await?;
        match staleness::assess(dest, &remote).await? {
            Decision::Skip => {
                info!("File already exists locally.");
                return Ok(Outcome::Skipped);
            }
            Decision::Fetch(reason) => debug!("fetching {} ({:?})", dest.display(), reason),
        }

        let plan = self.planner.plan(&remote);
        info!("Fetching {} bytes as {}", remote.size, plan);
        let staging_dir = self
            .staging_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        let report = TransferExecutor::new(&self.session, staging_dir)
            .execute(url, dest, &plan)
            .await?;
        info!(
            "Artifactory response: {} ({} bytes in {} segments written to {})",
            report.status,
            report.bytes,
            report.segments,
            dest.display()
        );
        Ok(Outcome::Downloaded)
    }
}

/// Fans artifacts out over a fixed number of workers. Each worker walks its
/// own stripe of the artifact list, so no cursor or lock is shared.
pub struct Dispatcher {
    session: Session,
    config: Arc<TransferConfig>,
    staging_dir: Option<PathBuf>,
    cancel: CancellationToken,
}

impl Dispatcher {
    pub fn new(session: Session, config: Arc<TransferConfig>) -> Self {
        Dispatcher {
            session,
            config,
            staging_dir: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Directory for in-flight transfers. Defaults to the system temp dir.
    pub fn staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = Some(dir.into());
        self
    }

    pub fn cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Blocks until every worker has finished its stripe. A failed artifact is
    /// counted and never stops the others.
    ///
    /// With `dry_run` set, each worker only logs the artifacts it would fetch
    /// and counts them as `planned`; this serves plan-only callers, since
    /// [`download`](super::download) stops before the search in a dry run.
    pub async fn run(self, artifacts: Vec<ArtifactDescriptor>) -> TransferSummary {
        let artifacts: Arc<[ArtifactDescriptor]> = artifacts.into();
        let dry_run = self.config.dry_run;
        let worker = Arc::new(Worker {
            planner: RangePlanner::from_config(&self.config),
            session: self.session,
            config: self.config,
            staging_dir: self.staging_dir,
            stats: TransferStats::default(),
            cancel: self.cancel,
        });

        let handles = (0..worker.config.threads)
            .map(|worker_id| {
                let worker = Arc::clone(&worker);
                let artifacts = Arc::clone(&artifacts);
                let span = if dry_run {
                    info_span!("worker", id = worker_id, dry_run = true)
                } else {
                    info_span!("worker", id = worker_id)
                };
                tokio::spawn(
                    async move { worker.run(worker_id, &artifacts).await }.instrument(span),
                )
            })
            .collect::<Vec<_>>();

        for handle in handles {
            if let Err(err) = handle.await {
                error!("worker stopped unexpectedly: {}", err);
            }
        }

        worker.stats.summary()
    }
}
