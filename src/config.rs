use std::path::PathBuf;

use reqwest::Url;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::warn;

use crate::error::ConfigError;
use crate::query::{Property, parse_props};

pub const DEFAULT_THREADS: usize = 3;
pub const DEFAULT_MIN_SPLIT_KB: i64 = 5120;
pub const DEFAULT_SPLIT_COUNT: i64 = 3;
pub const MAX_SPLIT_COUNT: usize = 15;

/// How requests authenticate against the repository server.
#[derive(Debug, Clone, Default)]
pub enum Credentials {
    #[default]
    Anonymous,
    Basic {
        user: String,
        password: String,
    },
    /// A header set produced by an external authenticator, sent as-is.
    Headers(HeaderMap),
}

/// Validated connection details, shared read-only by every request of a run.
#[derive(Debug, Clone)]
pub struct ServerDetails {
    /// Always ends with `/`.
    pub url: String,
    pub credentials: Credentials,
}

#[derive(Debug, Clone, Default)]
pub struct ServerOptions {
    pub url: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    /// `Name: value` entries.
    pub headers: Vec<String>,
}

impl ServerOptions {
    pub fn validate(self) -> Result<ServerDetails, ConfigError> {
        let url = self
            .url
            .filter(|url| !url.trim().is_empty())
            .ok_or(ConfigError::MissingUrl)?;
        let url = add_trailing_slash(url.trim());
        Url::parse(&url).map_err(|err| ConfigError::InvalidUrl {
            url: url.clone(),
            reason: err.to_string(),
        })?;

        let credentials = if !self.headers.is_empty() {
            Credentials::Headers(parse_headers(&self.headers)?)
        } else {
            match (self.user, self.password) {
                (Some(user), Some(password)) if !user.is_empty() && !password.is_empty() => {
                    Credentials::Basic { user, password }
                }
                _ => Credentials::Anonymous,
            }
        };

        Ok(ServerDetails { url, credentials })
    }
}

fn add_trailing_slash(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{}/", url)
    }
}

fn parse_headers(raw: &[String]) -> Result<HeaderMap, ConfigError> {
    let mut headers = HeaderMap::new();
    for entry in raw {
        let invalid = || ConfigError::InvalidHeader(entry.clone());
        let (name, value) = entry.split_once(':').ok_or_else(invalid)?;
        let name = HeaderName::from_bytes(name.trim().as_bytes()).map_err(|_| invalid())?;
        let value = HeaderValue::from_str(value.trim()).map_err(|_| invalid())?;
        headers.append(name, value);
    }
    Ok(headers)
}

/// Raw transfer options as supplied by the caller. Every `None` falls back to
/// the documented default when validated.
#[derive(Debug, Clone, Default)]
pub struct TransferOptions {
    /// Artifacts transferred in parallel. Default [`DEFAULT_THREADS`].
    pub threads: Option<usize>,
    /// Include sub-directories. Default `true`.
    pub recursive: Option<bool>,
    /// Write every artifact directly into the target directory instead of
    /// mirroring the remote hierarchy. Default `false`.
    pub flat: Option<bool>,
    /// `key=value;key2=value2,...` filter.
    pub props: Option<String>,
    pub use_regexp: bool,
    /// Minimum size in KB before a file is split; negative disables splitting.
    /// Default [`DEFAULT_MIN_SPLIT_KB`].
    pub min_split_kb: Option<i64>,
    /// Segments per split file, 0 disables splitting. Default
    /// [`DEFAULT_SPLIT_COUNT`], capped at [`MAX_SPLIT_COUNT`].
    pub split_count: Option<i64>,
    pub dry_run: bool,
    /// Local root for downloaded artifacts. Default `.`.
    pub target_dir: Option<PathBuf>,
}

impl TransferOptions {
    pub fn validate(self) -> Result<TransferConfig, ConfigError> {
        let threads = self.threads.unwrap_or(DEFAULT_THREADS);
        if threads < 1 {
            return Err(ConfigError::InvalidThreads);
        }

        let split_count = self.split_count.unwrap_or(DEFAULT_SPLIT_COUNT);
        if split_count < 0 {
            return Err(ConfigError::NegativeSplitCount(split_count));
        }
        let split_count = match usize::try_from(split_count) {
            Ok(count) if count <= MAX_SPLIT_COUNT => count,
            _ => {
                warn!(
                    "--split-count {} exceeds the maximum, using {}",
                    split_count, MAX_SPLIT_COUNT
                );
                MAX_SPLIT_COUNT
            }
        };

        let props = match self.props.as_deref() {
            Some(raw) => parse_props(raw)?,
            None => Vec::new(),
        };

        Ok(TransferConfig {
            threads,
            recursive: self.recursive.unwrap_or(true),
            flat: self.flat.unwrap_or(false),
            props,
            use_regexp: self.use_regexp,
            min_split_kb: self.min_split_kb.unwrap_or(DEFAULT_MIN_SPLIT_KB),
            split_count,
            dry_run: self.dry_run,
            target_dir: self.target_dir.unwrap_or_else(|| PathBuf::from(".")),
        })
    }
}

/// Validated, immutable settings for one run.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    pub threads: usize,
    pub recursive: bool,
    pub flat: bool,
    pub props: Vec<Property>,
    pub use_regexp: bool,
    pub min_split_kb: i64,
    pub split_count: usize,
    pub dry_run: bool,
    pub target_dir: PathBuf,
}

impl TransferConfig {
    pub fn split_enabled(&self) -> bool {
        self.split_count > 0 && self.min_split_kb >= 0
    }

    /// Upper bound on simultaneous connections: every worker may be running a
    /// split transfer at the same time.
    pub fn max_connections(&self) -> usize {
        if self.split_enabled() {
            self.threads * self.split_count
        } else {
            self.threads
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            threads: DEFAULT_THREADS,
            recursive: true,
            flat: false,
            props: Vec::new(),
            use_regexp: false,
            min_split_kb: DEFAULT_MIN_SPLIT_KB,
            split_count: DEFAULT_SPLIT_COUNT as usize,
            dry_run: false,
            target_dir: PathBuf::from("."),
        }
    }
}
