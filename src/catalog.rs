use std::fmt;
use std::path::{Path, PathBuf};

use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use tracing::info;

use crate::error::DiscoveryError;
use crate::query::SearchQuery;
use crate::session::Session;

/// One remote artifact, as returned by the search endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ArtifactDescriptor {
    pub repo: String,
    /// Directory inside the repository, `.` for the repository root.
    pub path: String,
    pub name: String,
}

impl ArtifactDescriptor {
    fn is_root(&self) -> bool {
        self.path == "." || self.path.is_empty()
    }

    /// `{base}{repo}/{path}/{name}`, without the path segment at the root.
    pub fn download_url(&self, base_url: &str) -> String {
        if self.is_root() {
            format!("{}{}/{}", base_url, self.repo, self.name)
        } else {
            format!("{}{}/{}/{}", base_url, self.repo, self.path, self.name)
        }
    }

    /// Where the artifact lands under `target_dir`: mirrored by remote path,
    /// or directly in `target_dir` when `flat`.
    pub fn local_path(&self, target_dir: &Path, flat: bool) -> PathBuf {
        let mut local = target_dir.to_path_buf();
        if !flat && !self.is_root() {
            self.path
                .split('/')
                .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
                .for_each(|segment| local.push(segment));
        }
        local.push(&self.name);
        local
    }
}

impl fmt::Display for ArtifactDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            write!(f, "{}/{}", self.repo, self.name)
        } else {
            write!(f, "{}/{}/{}", self.repo, self.path, self.name)
        }
    }
}

#[derive(Debug, Deserialize)]
struct AqlSearchResult {
    results: Vec<ArtifactDescriptor>,
}

pub fn parse_search_response(body: &[u8]) -> Result<Vec<ArtifactDescriptor>, DiscoveryError> {
    let result: AqlSearchResult = serde_json::from_slice(body)?;
    Ok(result.results)
}

#[derive(Debug)]
pub enum SearchOutcome {
    Found(Vec<ArtifactDescriptor>),
    /// The server answered with a non-success status; nothing is processed.
    Rejected(StatusCode),
}

pub struct CatalogClient<'a> {
    session: &'a Session,
}

impl<'a> CatalogClient<'a> {
    pub fn new(session: &'a Session) -> Self {
        CatalogClient { session }
    }

    pub async fn search(&self, query: &SearchQuery) -> Result<SearchOutcome, DiscoveryError> {
        let url = format!("{}api/search/aql", self.session.base_url());
        let response = self
            .session
            .post(&url)
            .header(CONTENT_TYPE, "text/plain")
            .body(query.aql().to_string())
            .send()
            .await?;

        let status = response.status();
        info!("Artifactory response: {}", status);
        if !status.is_success() {
            return Ok(SearchOutcome::Rejected(status));
        }

        let body = response.bytes().await?;
        let artifacts = parse_search_response(&body)?
            .into_iter()
            .filter(|artifact| query.matches(&artifact.path, &artifact.name))
            .collect();
        Ok(SearchOutcome::Found(artifacts))
    }
}
