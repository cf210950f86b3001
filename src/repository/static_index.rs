use anyhow::{Result, anyhow};
use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, info};
use regex::Regex;
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::OnceLock;
use std::time::Duration;

use super::rest::DEFAULT_TIMEOUT;
use super::{PackageSummary, Repository, VersionRecord};
use crate::error::PkgError;
use crate::http::{FetchResponse, Fetcher};
use crate::package::is_valid_package_id;

/// Archive of a repository at a commit; `{repo}` is `owner/name`.
pub const DEFAULT_ARCHIVE_TEMPLATE: &str = "https://github.com/{repo}/archive/{commit}.zip";

const RAW_CONTENT_BASE: &str = "https://raw.githubusercontent.com";

/// Entry of `releases/<name>.json`.
#[derive(Debug, Deserialize)]
struct StaticRelease {
    version: String,
    repo: String,
    commit: String,
}

/// Repository laid out as static files:
///
/// ```text
/// list.json               [summary, ...]
/// info/<name>.json        summary
/// releases/<name>.json    [{"version", "repo", "commit"}, ...]
/// ```
///
/// Archives are fetched from `archive_template` once `repo` and `commit`
/// have been validated.
pub struct StaticRepository {
    base: String,
    fetcher: Fetcher,
    timeout: Duration,
    archive_template: String,
}

impl StaticRepository {
    pub fn new(base: &str, fetcher: Fetcher) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            fetcher,
            timeout: DEFAULT_TIMEOUT,
            archive_template: DEFAULT_ARCHIVE_TEMPLATE.to_string(),
        }
    }

    /// `owner/repo[@ref]`, served from raw.githubusercontent.com.
    pub fn from_github(coordinate: &str, fetcher: Fetcher) -> Result<Self> {
        let (repo, git_ref) = coordinate.split_once('@').unwrap_or((coordinate, "master"));
        validate_repo(repo)?;
        if !is_valid_ref(git_ref) {
            return Err(PkgError::InvalidCoordinate(format!("ref {:?}", git_ref)).into());
        }
        Ok(Self::new(
            &format!("{}/{}/{}", RAW_CONTENT_BASE, repo, git_ref),
            fetcher,
        ))
    }

    pub fn with_archive_template(mut self, template: &str) -> Self {
        self.archive_template = template.to_string();
        self
    }

    /// `Ok(None)` on 404, error on any other non-success status.
    async fn get(&self, url: &str, timeout: Option<Duration>) -> Result<Option<FetchResponse>> {
        let response = self.fetcher.fetch(url, timeout).await?;
        if response.status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.is_success() {
            return Err(PkgError::Network(format!(
                "{} returned HTTP {}",
                url,
                response.status.as_u16()
            ))
            .into());
        }
        Ok(Some(response))
    }

    fn checked_name<'a>(&self, name: &'a str) -> Result<&'a str> {
        if is_valid_package_id(name) {
            Ok(name)
        } else {
            Err(PkgError::InvalidCoordinate(format!("package name {:?}", name)).into())
        }
    }

    async fn raw_releases(&self, name: &str) -> Result<Option<Vec<StaticRelease>>> {
        let name = self.checked_name(name)?;
        let url = format!("{}/releases/{}.json", self.base, name);
        match self.get(&url, Some(self.timeout)).await? {
            Some(response) => Ok(Some(response.json()?)),
            None => Ok(None),
        }
    }

    fn archive_url(&self, release: &StaticRelease) -> Result<String> {
        validate_repo(&release.repo)?;
        validate_commit(&release.commit)?;
        Ok(self
            .archive_template
            .replace("{repo}", &release.repo)
            .replace("{commit}", &release.commit))
    }
}

#[async_trait]
impl Repository for StaticRepository {
    fn base(&self) -> &str {
        &self.base
    }

    #[tracing::instrument(skip(self))]
    async fn single(&self, name: &str) -> Result<Option<PackageSummary>> {
        let name = self.checked_name(name)?;
        let url = format!("{}/info/{}.json", self.base, name);
        match self.get(&url, Some(self.timeout)).await? {
            Some(response) => Ok(Some(response.json()?)),
            None => Ok(None),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn list(&self) -> Result<Vec<PackageSummary>> {
        let url = format!("{}/list.json", self.base);
        let response = self
            .get(&url, Some(self.timeout))
            .await?
            .ok_or_else(|| anyhow!("{} not found", url))?;
        response.json()
    }

    #[tracing::instrument(skip(self))]
    async fn releases(&self, name: &str) -> Result<Option<Vec<VersionRecord>>> {
        let Some(releases) = self.raw_releases(name).await? else {
            return Ok(None);
        };
        Ok(Some(
            releases
                .into_iter()
                .map(|r| VersionRecord {
                    location: Some(format!("{}@{}", r.repo, r.commit)),
                    version: r.version,
                })
                .collect(),
        ))
    }

    #[tracing::instrument(skip(self))]
    async fn download(&self, name: &str, wanted: &VersionRecord) -> Result<Bytes> {
        let releases = self
            .raw_releases(name)
            .await?
            .ok_or_else(|| PkgError::NotFound {
                name: name.to_string(),
                repo: self.base.clone(),
            })?;

        let release = releases
            .iter()
            .find(|r| r.version == wanted.version)
            .ok_or_else(|| PkgError::NoMatchingRelease {
                name: name.to_string(),
                spec: format!("=={}", wanted.version),
                repo: self.base.clone(),
            })?;

        let url = self.archive_url(release)?;
        info!("Downloading {} {} from {}...", name, wanted.version, url);

        // archives can be large, so no per-request timeout here
        let response = self
            .get(&url, None)
            .await?
            .ok_or_else(|| PkgError::Network(format!("{} not found", url)))?;
        debug!("Downloaded {} bytes", response.body.len());
        Ok(response.body)
    }
}

fn validate_repo(repo: &str) -> Result<()> {
    let valid = repo
        .split_once('/')
        .is_some_and(|(owner, name)| is_valid_segment(owner) && is_valid_segment(name));
    if valid {
        Ok(())
    } else {
        Err(PkgError::InvalidCoordinate(format!("repository {:?}", repo)).into())
    }
}

fn validate_commit(commit: &str) -> Result<()> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| Regex::new("^[0-9a-f]{40}$").expect("valid commit pattern"));
    if pattern.is_match(commit) {
        Ok(())
    } else {
        Err(PkgError::InvalidCoordinate(format!("commit {:?}", commit)).into())
    }
}

/// One path segment: same character set as package ids.
fn is_valid_segment(segment: &str) -> bool {
    is_valid_package_id(segment)
}

fn is_valid_ref(git_ref: &str) -> bool {
    !git_ref.is_empty() && git_ref.split('/').all(is_valid_segment)
}
