use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod catalog;
mod checksum;
mod config;
mod downloader;
mod error;
mod query;
mod session;
#[cfg(test)]
mod test_support;
mod utils;
mod workdir;

use config::{ServerDetails, ServerOptions, TransferConfig, TransferOptions};
use downloader::{DownloadOutcome, RunStatus, download};
use error::Error;

#[derive(Parser)]
#[command(name = "artsync")]
#[command(about = "Mirror artifacts from an Artifactory repository to a local directory")]
#[command(version)]
struct Cli {
    #[arg(short, long, global = true, help = "Enable debug logging")]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Download every artifact matching a pattern
    #[command(alias = "d")]
    Download(DownloadArgs),
}

#[derive(Args)]
struct DownloadArgs {
    #[arg(help = "Artifacts to download, in the form <repository>/<path>, wildcards allowed")]
    pattern: String,

    #[arg(long, env = "ARTSYNC_URL", help = "Artifactory URL")]
    url: Option<String>,

    #[arg(long, env = "ARTSYNC_USER", help = "Artifactory username")]
    user: Option<String>,

    #[arg(long, env = "ARTSYNC_PASSWORD", hide_env_values = true, help = "Artifactory password")]
    password: Option<String>,

    #[arg(long = "header", help = "Extra request header as \"Name: value\", repeatable")]
    headers: Vec<String>,

    #[arg(long, help = "Only artifacts with these properties: key1=value1;key2=value2")]
    props: Option<String>,

    #[arg(long, help = "Include sub-directories [default: true]")]
    recursive: Option<bool>,

    #[arg(long, help = "Ignore the remote hierarchy and download into the target root [default: false]")]
    flat: Option<bool>,

    #[arg(long, help = "Treat the path part of the pattern as a regular expression")]
    regexp: bool,

    #[arg(
        long = "min-split",
        allow_negative_numbers = true,
        help = "Minimum file size in KB before it is downloaded in parallel ranges, -1 disables [default: 5120]"
    )]
    min_split: Option<i64>,

    #[arg(
        long = "split-count",
        allow_negative_numbers = true,
        help = "Number of ranges per split download, at most 15, 0 disables [default: 3]"
    )]
    split_count: Option<i64>,

    #[arg(long, help = "Number of artifacts downloaded in parallel [default: 3]")]
    threads: Option<usize>,

    #[arg(long = "dry-run", help = "Only log the search query, download nothing")]
    dry_run: bool,

    #[arg(long, help = "Local directory artifacts are written to [default: .]")]
    target: Option<PathBuf>,
}

impl DownloadArgs {
    fn into_options(self) -> (String, ServerOptions, TransferOptions) {
        let server = ServerOptions {
            url: self.url,
            user: self.user,
            password: self.password,
            headers: self.headers,
        };
        let transfer = TransferOptions {
            threads: self.threads,
            recursive: self.recursive,
            flat: self.flat,
            props: self.props,
            use_regexp: self.regexp,
            min_split_kb: self.min_split,
            split_count: self.split_count,
            dry_run: self.dry_run,
            target_dir: self.target,
        };
        (self.pattern, server, transfer)
    }
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn validate(
    server: ServerOptions,
    transfer: TransferOptions,
) -> Result<(ServerDetails, TransferConfig), Error> {
    Ok((server.validate()?, transfer.validate()?))
}

/// Rejected arguments are configuration errors and exit with the error code,
/// never with the code reserved for partial failures.
fn usage_exit(err: &clap::Error) -> ExitCode {
    if err.use_stderr() {
        RunStatus::Error.into()
    } else {
        ExitCode::SUCCESS
    }
}

async fn run_download(args: DownloadArgs) -> RunStatus {
    let (pattern, server, transfer) = args.into_options();
    let (server, config) = match validate(server, transfer) {
        Ok(validated) => validated,
        Err(err) => {
            error!("{}", err);
            return RunStatus::Error;
        }
    };

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, abandoning in-flight transfers");
            interrupt.cancel();
        }
    });

    match download(&pattern, &server, config, cancel).await {
        Ok(outcome) => {
            if let DownloadOutcome::SearchRejected(status) = &outcome {
                error!("Artifactory search returned {}", status);
            }
            outcome.status()
        }
        Err(err) => {
            error!("{}", err);
            RunStatus::Error
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return usage_exit(&err);
        }
    };
    init_tracing(cli.verbose);

    match cli.command {
        Some(Commands::Download(args)) => run_download(args).await.into(),
        None => {
            info!("Use --help for available commands");
            ExitCode::SUCCESS
        }
    }
}
