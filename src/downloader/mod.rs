mod dispatcher;
mod executor;
mod planer;
mod probe;
mod staleness;

use std::process::ExitCode;
use std::sync::Arc;

use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::catalog::{CatalogClient, SearchOutcome};
use crate::config::{MAX_SPLIT_COUNT, ServerDetails, TransferConfig};
use crate::error::Error;
use crate::query::QueryBuilder;
use crate::session::Session;
use crate::workdir::WorkDir;

pub use dispatcher::{Dispatcher, TransferSummary};

/// Verdict of a run, mapped onto the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    /// Some artifacts failed, others went through.
    Warning,
    Error,
}

impl From<RunStatus> for ExitCode {
    fn from(status: RunStatus) -> Self {
        match status {
            RunStatus::Success => ExitCode::SUCCESS,
            RunStatus::Error => ExitCode::from(1),
            RunStatus::Warning => ExitCode::from(2),
        }
    }
}

#[derive(Debug)]
pub enum DownloadOutcome {
    /// Only the query was built and logged.
    DryRun,
    /// The search endpoint refused the query; nothing was transferred.
    SearchRejected(StatusCode),
    Completed(TransferSummary),
}

impl DownloadOutcome {
    pub fn status(&self) -> RunStatus {
        match self {
            DownloadOutcome::DryRun => RunStatus::Success,
            DownloadOutcome::SearchRejected(_) => RunStatus::Error,
            DownloadOutcome::Completed(summary) if summary.failed == 0 => RunStatus::Success,
            DownloadOutcome::Completed(summary) if summary.succeeded() > 0 => RunStatus::Warning,
            DownloadOutcome::Completed(_) => RunStatus::Error,
        }
    }
}

/// Searches the repository for `pattern` and fetches every stale or missing
/// match into the configured target directory.
pub async fn download(
    pattern: &str,
    server: &ServerDetails,
    config: TransferConfig,
    cancel: CancellationToken,
) -> Result<DownloadOutcome, Error> {
    let query = QueryBuilder::from_config(&config).build(pattern)?;
    info!("Searching Artifactory using AQL query: {}", query);
    if config.dry_run {
        return Ok(DownloadOutcome::DryRun);
    }

    let session = Session::new(server).map_err(Error::Client)?;
    let artifacts = match CatalogClient::new(&session).search(&query).await? {
        SearchOutcome::Found(artifacts) => artifacts,
        SearchOutcome::Rejected(status) => {
            warn!("Search failed with {}, no artifacts downloaded", status);
            return Ok(DownloadOutcome::SearchRejected(status));
        }
    };
    info!("Found {} artifacts.", artifacts.len());

    if config.split_enabled() && config.max_connections() > MAX_SPLIT_COUNT {
        warn!(
            "{} threads x {} segments may open up to {} concurrent connections",
            config.threads,
            config.split_count,
            config.max_connections()
        );
    }

    let workdir = WorkDir::create(&config.target_dir).map_err(Error::WorkDir)?;
    let summary = Dispatcher::new(session, Arc::new(config))
        .staging_dir(workdir.path())
        .cancel_token(cancel)
        .run(artifacts)
        .await;
    workdir.close().map_err(Error::WorkDir)?;

    info!(
        "Downloaded {} artifacts from Artifactory, {} already up to date, {} failed.",
        summary.downloaded, summary.skipped, summary.failed
    );
    Ok(DownloadOutcome::Completed(summary))
}
