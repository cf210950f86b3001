use anyhow::Result;
use std::fmt;

use super::VersionSpec;
use crate::repository::{PackageSummary, RepoHandle};
use crate::resolver::{InstallReport, Installer};
use crate::runtime::Runtime;

/// A package as described by a repository, not yet downloaded.
#[derive(Clone)]
pub struct RemotePackage {
    pub id: String,
    pub name: Option<String>,
    pub version: String,
    pub description: Option<String>,
    pub author: Option<String>,
    pub repo: RepoHandle,
}

impl fmt::Debug for RemotePackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemotePackage")
            .field("id", &self.id)
            .field("version", &self.version)
            .field("repo", &self.repo.base())
            .finish()
    }
}

impl RemotePackage {
    pub fn from_summary(summary: PackageSummary, repo: RepoHandle) -> Self {
        Self {
            id: summary.id,
            name: summary.name,
            version: summary.version,
            description: summary.description,
            author: summary.author,
            repo,
        }
    }

    /// Asks `repo` about one package; `Ok(None)` if it does not have it.
    pub async fn lookup(repo: &RepoHandle, name: &str) -> Result<Option<Self>> {
        Ok(repo
            .single(name)
            .await?
            .map(|summary| Self::from_summary(summary, repo.clone())))
    }

    pub async fn list(repo: &RepoHandle) -> Result<Vec<Self>> {
        Ok(repo
            .list()
            .await?
            .into_iter()
            .map(|summary| Self::from_summary(summary, repo.clone()))
            .collect())
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Installs the newest release from the owning repository.
    pub async fn install<R: Runtime + 'static>(
        &self,
        installer: &Installer<R>,
        upgrade: bool,
    ) -> Result<InstallReport> {
        installer
            .install_from_repo(self.repo.clone(), &self.id, &VersionSpec::any(), upgrade)
            .await
    }
}
