//! Package repositories.
//!
//! A repository answers four questions: what packages exist, what is known
//! about one package, which releases it has, and what the archive of one
//! release is. Lookups return `Ok(None)` when the repository does not know
//! the package and `Err` when it could not be asked.
//!
//! - `rest` - JSON API (`/search`, `/info`, `/releases`, `/download`)
//! - `static_index` - static files (`list.json`, `info/`, `releases/`)

mod rest;
mod static_index;

use anyhow::{Result, bail};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::http::Fetcher;
use crate::package::RemotePackage;

pub use rest::RestRepository;
pub use static_index::{DEFAULT_ARCHIVE_TEMPLATE, StaticRepository};

/// Repositories queried at once by [`list_all`].
const MAX_CONCURRENT: usize = 10;

/// Package descriptor as served by a repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageSummary {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
}

/// One published release of a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub version: String,
    /// Download URL or storage coordinate, when the repository exposes one.
    #[serde(default, alias = "url")]
    pub location: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Repository: Send + Sync {
    /// Identifier the repository was created from.
    fn base(&self) -> &str;

    async fn single(&self, name: &str) -> Result<Option<PackageSummary>>;

    async fn list(&self) -> Result<Vec<PackageSummary>>;

    async fn releases(&self, name: &str) -> Result<Option<Vec<VersionRecord>>>;

    /// Fetches the archive of a release as advertised by [`Repository::releases`].
    async fn download(&self, name: &str, release: &VersionRecord) -> Result<Bytes>;
}

pub type RepoHandle = Arc<dyn Repository>;

/// Builds a repository from a configured base identifier:
///
/// - `github:owner/repo[@ref]` - static index on raw.githubusercontent.com
/// - `static+https://host/path` - static index at that URL
/// - any other `http(s)` URL - REST API
pub fn from_base(base: &str, fetcher: Fetcher) -> Result<RepoHandle> {
    if let Some(coordinate) = base.strip_prefix("github:") {
        return Ok(Arc::new(StaticRepository::from_github(coordinate, fetcher)?));
    }
    if let Some(url) = base.strip_prefix("static+") {
        return Ok(Arc::new(StaticRepository::new(url, fetcher)));
    }
    if base.starts_with("http://") || base.starts_with("https://") {
        return Ok(Arc::new(RestRepository::new(base, fetcher)));
    }
    bail!("Unrecognized repository {:?}", base)
}

/// Lists packages from every repository, skipping those that fail.
#[tracing::instrument(skip(repos))]
pub async fn list_all(repos: &[RepoHandle]) -> Vec<RemotePackage> {
    let results: Vec<(RepoHandle, Result<Vec<RemotePackage>>)> = stream::iter(repos.iter().cloned())
        .map(|repo| async move {
            let result = RemotePackage::list(&repo).await;
            (repo, result)
        })
        .buffer_unordered(MAX_CONCURRENT)
        .collect()
        .await;

    let mut packages = Vec::new();
    for (repo, result) in results {
        match result {
            Ok(found) => {
                debug!("{} package(s) on {}", found.len(), repo.base());
                packages.extend(found);
            }
            Err(e) => warn!("Failed to list packages on {}: {:#}", repo.base(), e),
        }
    }
    packages
}

/// Returns the package from the first repository, in order, that has it.
///
/// Repositories that fail are logged and skipped.
#[tracing::instrument(skip(repos))]
pub async fn find_package(repos: &[RepoHandle], name: &str) -> Option<RemotePackage> {
    for repo in repos {
        match RemotePackage::lookup(repo, name).await {
            Ok(Some(package)) => return Some(package),
            Ok(None) => debug!("{} not found on {}", name, repo.base()),
            Err(e) => warn!("Failed to query {} for {}: {:#}", repo.base(), name, e),
        }
    }
    None
}
