//! Dependency-aware installation from a repository.
//!
//! [`Installer::install_from_repo`] walks the dependency tree depth first:
//! each package is materialized (reused, or downloaded and extracted), then
//! its dependencies are resolved, then its install scripts run and it is
//! loaded. Dependencies are therefore on disk before a dependent's scripts
//! run.
//!
//! Concurrent trees are serialized per package id by [`PackageLocks`]. A
//! package's lock is held while it is materialized and again while its
//! scripts run, never across the recursion into its dependencies.

mod locks;

use anyhow::{Context, Result, bail};
use bytes::Bytes;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use indexmap::IndexMap;
use log::{debug, info, warn};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::archive::PackageArchive;
use crate::error::PkgError;
use crate::package::{
    LocalPackage, LocalRegistry, MANIFEST_FILE, REMOVED_MARKER, Version, VersionSpec,
};
use crate::repository::{RepoHandle, find_package};
use crate::runtime::Runtime;

pub use locks::PackageLocks;

/// Outcome of one top-level installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    /// The package that was asked for.
    pub package: String,
    /// Every package visited, in resolution order.
    pub installed: Vec<(String, Version)>,
    /// Packages whose modules load only after the host restarts.
    pub restart_pending: Vec<(String, Version)>,
    /// Archives downloaded while resolving.
    pub downloads: usize,
}

impl InstallReport {
    fn log_summary(&self) {
        info!("Successfully installed {}", join(&self.installed));
        if !self.restart_pending.is_empty() {
            info!("Modules in the following packages will be loaded after restarting the host.");
            info!("  {}", join(&self.restart_pending));
        }
    }
}

impl fmt::Display for InstallReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", join(&self.installed))
    }
}

fn join(packages: &[(String, Version)]) -> String {
    packages
        .iter()
        .map(|(id, version)| format!("{}-{}", id, version))
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Default)]
struct Resolution {
    /// id -> (version, restart_required)
    visited: IndexMap<String, (Version, bool)>,
    downloads: usize,
}

impl Resolution {
    fn into_report(self, package: &str) -> InstallReport {
        let restart_pending = self
            .visited
            .iter()
            .filter(|(_, (_, restart))| *restart)
            .map(|(id, (version, _))| (id.clone(), version.clone()))
            .collect();
        InstallReport {
            package: package.to_string(),
            installed: self
                .visited
                .into_iter()
                .map(|(id, (version, _))| (id, version))
                .collect(),
            restart_pending,
            downloads: self.downloads,
        }
    }
}

/// Installs, upgrades and removes packages of one registry.
pub struct Installer<R: Runtime> {
    registry: Arc<LocalRegistry<R>>,
    locks: PackageLocks,
    remove_on_fail: bool,
}

impl<R: Runtime> Clone for Installer<R> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            locks: self.locks.clone(),
            remove_on_fail: self.remove_on_fail,
        }
    }
}

impl<R: Runtime + 'static> Installer<R> {
    pub fn new(registry: Arc<LocalRegistry<R>>, locks: PackageLocks) -> Self {
        Self {
            registry,
            locks,
            remove_on_fail: false,
        }
    }

    /// Removes a package again when its install scripts fail.
    pub fn with_remove_on_fail(mut self, remove_on_fail: bool) -> Self {
        self.remove_on_fail = remove_on_fail;
        self
    }

    pub fn registry(&self) -> &LocalRegistry<R> {
        &self.registry
    }

    /// Installs `name` and its dependencies from `repo`.
    ///
    /// An installed package that satisfies `spec` is kept unless
    /// `allow_upgrade` is set, in which case the newest matching release
    /// replaces it.
    #[tracing::instrument(skip(self, repo, spec), fields(repo = repo.base(), spec = %spec))]
    pub async fn install_from_repo(
        &self,
        repo: RepoHandle,
        name: &str,
        spec: &VersionSpec,
        allow_upgrade: bool,
    ) -> Result<InstallReport> {
        let mut resolution = Resolution::default();
        self.resolve(
            &repo,
            name.to_string(),
            spec.clone(),
            allow_upgrade,
            &mut resolution,
        )
        .await?;

        let report = resolution.into_report(name);
        report.log_summary();
        Ok(report)
    }

    fn resolve<'a>(
        &'a self,
        repo: &'a RepoHandle,
        name: String,
        spec: VersionSpec,
        allow_upgrade: bool,
        resolution: &'a mut Resolution,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            if resolution.visited.contains_key(&name) {
                warn!("{}", PkgError::CyclicDependency { name });
                return Ok(());
            }

            let (mut package, downloaded) = {
                let _guard = self.locks.acquire(&name).await;
                self.materialize(repo, &name, &spec, allow_upgrade, resolution)
                    .await?
            };

            let manifest = package.manifest(self.registry.runtime())?;
            resolution.visited.insert(
                name.clone(),
                (package.version.clone(), manifest.restart_required),
            );

            for (dep, dep_spec) in manifest.dependency_specs()? {
                self.resolve(repo, dep, dep_spec, allow_upgrade, resolution)
                    .await?;
            }

            let _guard = self.locks.acquire(&name).await;
            // install scripts block on child processes
            let registry = self.registry.clone();
            let remove_on_fail = self.remove_on_fail;
            let restart_required = manifest.restart_required;
            tokio::task::spawn_blocking(move || -> Result<()> {
                if downloaded {
                    package.install(&registry, remove_on_fail)?;
                }
                if !restart_required {
                    package.load(&registry, false)?;
                }
                Ok(())
            })
            .await
            .with_context(|| format!("Install task for {} failed", name))?
        }
        .boxed()
    }

    /// Returns the package to use for `name` and whether it was downloaded.
    async fn materialize(
        &self,
        repo: &RepoHandle,
        name: &str,
        spec: &VersionSpec,
        allow_upgrade: bool,
        resolution: &mut Resolution,
    ) -> Result<(LocalPackage, bool)> {
        let prev = self.registry.by_name(name)?;
        let satisfies_local = prev.as_ref().is_some_and(|p| spec.matches(&p.version));

        let target = if allow_upgrade || !satisfies_local {
            debug!("Fetching releases for {} from {}...", name, repo.base());
            let releases = repo
                .releases(name)
                .await?
                .ok_or_else(|| PkgError::NotFound {
                    name: name.to_string(),
                    repo: repo.base().to_string(),
                })?;

            // the record travels on unchanged: repositories expect the
            // version string exactly as they advertised it
            let (best, release) = releases
                .into_iter()
                .filter_map(|r| match Version::parse(&r.version) {
                    Ok(version) => Some((version, r)),
                    Err(e) => {
                        debug!("Ignoring release {:?} of {}: {:#}", r.version, name, e);
                        None
                    }
                })
                .filter(|(version, _)| spec.matches(version))
                .max_by(|(a, _), (b, _)| a.cmp(b))
                .ok_or_else(|| PkgError::NoMatchingRelease {
                    name: name.to_string(),
                    spec: spec.to_string(),
                    repo: repo.base().to_string(),
                })?;

            match &prev {
                Some(prev) if prev.version == best => None,
                _ => Some(release),
            }
        } else {
            None
        };

        let Some(release) = target else {
            let Some(prev) = prev else {
                bail!("No installed copy of {} to reuse", name);
            };
            if spec.is_any() {
                info!("Requirement already satisfied: {}", name);
            } else {
                info!("Requirement already satisfied: {}{}", name, spec);
            }
            return Ok((prev, false));
        };

        info!("Collecting {}...", name);
        let data = repo.download(name, &release).await?;
        resolution.downloads += 1;

        let installer = self.clone();
        let id = name.to_string();
        let package = tokio::task::spawn_blocking(move || installer.unpack(&id, data, prev))
            .await
            .with_context(|| format!("Extraction task for {} failed", name))??;
        Ok((package, true))
    }

    /// Replaces any previous copy of `name` with the archive's contents.
    fn unpack(&self, name: &str, data: Bytes, prev: Option<LocalPackage>) -> Result<LocalPackage> {
        let runtime = self.registry.runtime();
        let mut archive = PackageArchive::open(data)?;
        let manifest = archive.manifest()?;
        if manifest.id != name {
            return Err(PkgError::CorruptManifest {
                path: PathBuf::from(archive.prefix()).join(MANIFEST_FILE),
                reason: format!("expected id {:?}, found {:?}", name, manifest.id),
            }
            .into());
        }

        let dest = self.registry.package_path(&manifest.id)?;
        if let Some(mut prev) = prev {
            info!("Removing {}-{}...", prev.id, prev.version);
            prev.remove(&self.registry)?;
        }

        if runtime.exists(&dest) {
            if !runtime.exists(&dest.join(REMOVED_MARKER)) {
                bail!("Install path {:?} already exists", dest);
            }
            runtime
                .remove_dir_all(&dest)
                .with_context(|| format!("Failed to clear stale directory {:?}", dest))?;
        }

        info!("Extracting into {:?}...", dest);
        archive.extract_to(runtime, &dest)?;

        // an archive may ship the marker itself
        let marker = dest.join(REMOVED_MARKER);
        if runtime.exists(&marker) {
            runtime.remove_file(&marker)?;
        }

        Ok(LocalPackage::new(manifest.id, manifest.version, dest))
    }

    /// Removes an installed package.
    #[tracing::instrument(skip(self))]
    pub async fn remove(&self, name: &str) -> Result<LocalPackage> {
        let _guard = self.locks.acquire(name).await;
        let mut package = self
            .registry
            .by_name(name)?
            .ok_or_else(|| PkgError::NotInstalled(name.to_string()))?;

        let registry = self.registry.clone();
        let package = tokio::task::spawn_blocking(move || -> Result<LocalPackage> {
            package.remove(&registry)?;
            Ok(package)
        })
        .await
        .with_context(|| format!("Removal task for {} failed", name))??;
        info!("Successfully removed {}-{}", package.id, package.version);
        Ok(package)
    }

    /// Reinstalls an installed package with the newest release found in
    /// `repos`.
    #[tracing::instrument(skip(self, repos))]
    pub async fn upgrade(&self, repos: &[RepoHandle], name: &str) -> Result<InstallReport> {
        if self.registry.by_name(name)?.is_none() {
            return Err(PkgError::NotInstalled(name.to_string()).into());
        }

        let Some(remote) = find_package(repos, name).await else {
            return Err(PkgError::NotFound {
                name: name.to_string(),
                repo: repos
                    .iter()
                    .map(|r| r.base())
                    .collect::<Vec<_>>()
                    .join(", "),
            }
            .into());
        };
        remote.install(self, true).await
    }

    pub fn spawn_install(
        &self,
        repo: RepoHandle,
        name: String,
        spec: VersionSpec,
        allow_upgrade: bool,
    ) -> JoinHandle<Result<InstallReport>> {
        let installer = self.clone();
        tokio::spawn(async move {
            installer
                .install_from_repo(repo, &name, &spec, allow_upgrade)
                .await
        })
    }

    pub fn spawn_remove(&self, name: String) -> JoinHandle<Result<LocalPackage>> {
        let installer = self.clone();
        tokio::spawn(async move { installer.remove(&name).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{ConnectionPool, FetchOptions, Fetcher};
    use crate::repository::RestRepository;
    use crate::runtime::RealRuntime;
    use crate::test_utils::{InMemoryRepository, RecordingHost, build_archive, write_package};
    use std::fs;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::tempdir;
    use test_log::test;

    fn installer(root: &Path, host: Arc<RecordingHost>) -> Installer<RealRuntime> {
        let registry =
            LocalRegistry::open(Arc::new(RealRuntime), host, root.to_path_buf(), Vec::new())
                .unwrap();
        Installer::new(Arc::new(registry), PackageLocks::new())
    }

    fn spec(s: &str) -> VersionSpec {
        VersionSpec::parse(s).unwrap()
    }

    #[test(tokio::test)]
    async fn test_install_extracts_and_loads() {
        let dir = tempdir().unwrap();
        let host = Arc::new(RecordingHost::default());
        let repo = Arc::new(
            InMemoryRepository::new()
                .with(&[("info.json", r#"{"id": "x", "version": "1.0.0"}"#)]),
        );
        let installer = installer(dir.path(), host.clone());

        let report = installer
            .install_from_repo(repo.clone(), "x", &VersionSpec::any(), false)
            .await
            .unwrap();

        assert_eq!(report.installed, vec![("x".to_string(), Version::new(1, 0, 0))]);
        assert_eq!(report.downloads, 1);
        assert_eq!(report.to_string(), "x-1.0.0");

        let local = installer.registry().by_name("x").unwrap().unwrap();
        assert_eq!(local.path, dir.path().join("x"));
        assert_eq!(host.registered(), vec![dir.path().join("x")]);
    }

    #[test(tokio::test)]
    async fn test_satisfied_package_is_not_downloaded_again() {
        let dir = tempdir().unwrap();
        let repo = Arc::new(
            InMemoryRepository::new()
                .with(&[("info.json", r#"{"id": "x", "version": "1.0.0"}"#)]),
        );
        let installer = installer(dir.path(), Arc::new(RecordingHost::default()));

        installer
            .install_from_repo(repo.clone(), "x", &VersionSpec::any(), false)
            .await
            .unwrap();
        let again = installer
            .install_from_repo(repo.clone(), "x", &VersionSpec::any(), false)
            .await
            .unwrap();

        assert_eq!(again.downloads, 0);
        assert_eq!(repo.downloads(), 1);
        assert_eq!(again.installed, vec![("x".to_string(), Version::new(1, 0, 0))]);
    }

    #[test(tokio::test)]
    async fn test_picks_highest_matching_release() {
        let dir = tempdir().unwrap();
        let repo = Arc::new(
            InMemoryRepository::new()
                .with(&[("info.json", r#"{"id": "x", "version": "1.2.3"}"#)])
                .with(&[("info.json", r#"{"id": "x", "version": "1.9.0"}"#)])
                .with(&[("info.json", r#"{"id": "x", "version": "2.0.0"}"#)]),
        );
        let installer = installer(dir.path(), Arc::new(RecordingHost::default()));

        let report = installer
            .install_from_repo(repo, "x", &spec(">=1.0,<2.0"), false)
            .await
            .unwrap();

        assert_eq!(report.installed[0].1, Version::new(1, 9, 0));
    }

    #[test(tokio::test)]
    async fn test_cycle_installs_each_package_once() {
        let dir = tempdir().unwrap();
        let repo = Arc::new(
            InMemoryRepository::new()
                .with(&[(
                    "info.json",
                    r#"{"id": "a", "version": "1.0.0", "dependencies": {"b": "*"}}"#,
                )])
                .with(&[(
                    "info.json",
                    r#"{"id": "b", "version": "1.0.0", "dependencies": {"a": "*"}}"#,
                )]),
        );
        let installer = installer(dir.path(), Arc::new(RecordingHost::default()));

        let report = installer
            .install_from_repo(repo.clone(), "a", &VersionSpec::any(), false)
            .await
            .unwrap();

        let ids: Vec<&str> = report.installed.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(repo.downloads(), 2);
    }

    #[test(tokio::test)]
    async fn test_dependencies_installed_before_dependent_scripts() {
        let dir = tempdir().unwrap();
        let host = Arc::new(RecordingHost::default());
        let repo = Arc::new(
            InMemoryRepository::new()
                .with(&[
                    (
                        "app-1.0.0/info.json",
                        r#"{"id": "app", "version": "1.0.0",
                            "dependencies": {"lib": ">=1.0"}, "installers": ["setup.py"]}"#,
                    ),
                    ("app-1.0.0/setup.py", ""),
                ])
                .with(&[
                    (
                        "info.json",
                        r#"{"id": "lib", "version": "1.1.0", "installers": ["setup.py"]}"#,
                    ),
                    ("setup.py", ""),
                ]),
        );
        let installer = installer(dir.path(), host.clone());

        installer
            .install_from_repo(repo, "app", &VersionSpec::any(), false)
            .await
            .unwrap();

        assert_eq!(
            host.scripts(),
            vec![
                dir.path().join("lib").join("setup.py"),
                dir.path().join("app").join("setup.py"),
            ]
        );
        assert!(dir.path().join("app/setup.py").is_file());
    }

    #[test(tokio::test)]
    async fn test_upgrade_replaces_only_when_allowed() {
        let dir = tempdir().unwrap();
        write_package(dir.path(), r#"{"id": "x", "version": "1.0.0"}"#);
        let repo = Arc::new(
            InMemoryRepository::new()
                .with(&[("info.json", r#"{"id": "x", "version": "1.0.0"}"#)])
                .with(&[("info.json", r#"{"id": "x", "version": "1.5.0"}"#)]),
        );
        let installer = installer(dir.path(), Arc::new(RecordingHost::default()));

        let kept = installer
            .install_from_repo(repo.clone(), "x", &VersionSpec::any(), false)
            .await
            .unwrap();
        assert_eq!(kept.downloads, 0);
        assert_eq!(kept.installed[0].1, Version::new(1, 0, 0));

        let upgraded = installer
            .install_from_repo(repo.clone(), "x", &VersionSpec::any(), true)
            .await
            .unwrap();
        assert_eq!(upgraded.downloads, 1);

        let local = installer.registry().by_name("x").unwrap().unwrap();
        assert_eq!(local.version, Version::new(1, 5, 0));
        assert!(!dir.path().join("x-removed").exists());
    }

    #[test(tokio::test)]
    async fn test_upgrade_through_configured_repositories() {
        let dir = tempdir().unwrap();
        write_package(dir.path(), r#"{"id": "x", "version": "1.0.0"}"#);
        let empty: RepoHandle = Arc::new(InMemoryRepository::new());
        let repo: RepoHandle = Arc::new(
            InMemoryRepository::new()
                .with(&[("info.json", r#"{"id": "x", "version": "2.0.0"}"#)]),
        );
        let installer = installer(dir.path(), Arc::new(RecordingHost::default()));

        let report = installer.upgrade(&[empty, repo], "x").await.unwrap();
        assert_eq!(report.installed[0].1, Version::new(2, 0, 0));

        let err = installer.upgrade(&[], "y").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PkgError>(),
            Some(PkgError::NotInstalled(_))
        ));
    }

    #[test(tokio::test)]
    async fn test_download_requests_advertised_version_string() {
        let dir = tempdir().unwrap();
        let mut server = mockito::Server::new_async().await;
        let _releases = server
            .mock("GET", "/releases?name=x")
            .with_status(200)
            .with_body(r#"{"success": true, "data": [{"version": "0.9"}, {"version": "1.0"}]}"#)
            .create_async()
            .await;
        let download = server
            .mock("GET", "/download?spec=x%3D%3D1.0")
            .with_status(200)
            .with_body(build_archive(&[(
                "info.json",
                r#"{"id": "x", "version": "1.0"}"#,
            )]))
            .create_async()
            .await;
        let fetcher = Fetcher::new(
            ConnectionPool::new(),
            FetchOptions {
                max_attempts: 1,
                retry_delay: Duration::ZERO,
                ..FetchOptions::default()
            },
        );
        let repo: RepoHandle = Arc::new(RestRepository::new(&server.url(), fetcher));
        let installer = installer(dir.path(), Arc::new(RecordingHost::default()));

        let report = installer
            .install_from_repo(repo, "x", &VersionSpec::any(), false)
            .await
            .unwrap();

        download.assert_async().await;
        assert_eq!(report.installed, vec![("x".to_string(), Version::new(1, 0, 0))]);
    }

    #[test(tokio::test)]
    async fn test_not_found_and_no_match_are_distinct() {
        let dir = tempdir().unwrap();
        let repo = Arc::new(
            InMemoryRepository::new()
                .with(&[("info.json", r#"{"id": "x", "version": "1.0.0"}"#)]),
        );
        let installer = installer(dir.path(), Arc::new(RecordingHost::default()));

        let unknown = installer
            .install_from_repo(repo.clone(), "ghost", &VersionSpec::any(), false)
            .await
            .unwrap_err();
        assert!(matches!(
            unknown.downcast_ref::<PkgError>(),
            Some(PkgError::NotFound { .. })
        ));

        let unmatched = installer
            .install_from_repo(repo, "x", &spec(">=2.0"), false)
            .await
            .unwrap_err();
        assert!(matches!(
            unmatched.downcast_ref::<PkgError>(),
            Some(PkgError::NoMatchingRelease { .. })
        ));
    }

    #[test(tokio::test)]
    async fn test_manifest_id_must_match_request() {
        let dir = tempdir().unwrap();
        let repo = Arc::new(
            InMemoryRepository::new()
                .with(&[("info.json", r#"{"id": "x", "version": "1.0.0"}"#)])
                .serving_as("y", "x"),
        );
        let installer = installer(dir.path(), Arc::new(RecordingHost::default()));

        let err = installer
            .install_from_repo(repo, "y", &VersionSpec::any(), false)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PkgError>(),
            Some(PkgError::CorruptManifest { .. })
        ));
        assert!(!dir.path().join("x").exists());
    }

    #[test(tokio::test)]
    async fn test_restart_required_is_not_loaded() {
        let dir = tempdir().unwrap();
        let host = Arc::new(RecordingHost::default());
        let repo = Arc::new(InMemoryRepository::new().with(&[(
            "info.json",
            r#"{"id": "x", "version": "1.0.0", "restart_required": true}"#,
        )]));
        let installer = installer(dir.path(), host.clone());

        let report = installer
            .install_from_repo(repo, "x", &VersionSpec::any(), false)
            .await
            .unwrap();

        assert_eq!(report.restart_pending, report.installed);
        assert!(host.registered().is_empty());
    }

    #[test(tokio::test)]
    async fn test_failed_installer_with_remove_on_fail() {
        let dir = tempdir().unwrap();
        let host = Arc::new(RecordingHost::failing_on("setup.py"));
        let repo = Arc::new(InMemoryRepository::new().with(&[(
            "info.json",
            r#"{"id": "x", "version": "1.0.0", "installers": ["setup.py"]}"#,
        )]));
        let installer = installer(dir.path(), host).with_remove_on_fail(true);

        let err = installer
            .install_from_repo(repo, "x", &VersionSpec::any(), false)
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<PkgError>(),
            Some(PkgError::InstallScript { .. })
        ));
        assert!(installer.registry().by_name("x").unwrap().is_none());
    }

    #[test(tokio::test)]
    async fn test_stale_marked_directory_is_replaced() {
        let dir = tempdir().unwrap();
        let installer = installer(dir.path(), Arc::new(RecordingHost::default()));
        // left behind after the registry was opened
        let stale = write_package(dir.path(), r#"{"id": "x", "version": "0.1.0"}"#);
        fs::write(stale.path.join(REMOVED_MARKER), "").unwrap();
        let repo = Arc::new(
            InMemoryRepository::new()
                .with(&[("info.json", r#"{"id": "x", "version": "1.0.0"}"#)]),
        );

        installer
            .install_from_repo(repo, "x", &VersionSpec::any(), false)
            .await
            .unwrap();

        let local = installer.registry().by_name("x").unwrap().unwrap();
        assert_eq!(local.version, Version::new(1, 0, 0));
        assert!(!local.path.join(REMOVED_MARKER).exists());
    }

    #[test(tokio::test)]
    async fn test_remove_unknown_package() {
        let dir = tempdir().unwrap();
        write_package(dir.path(), r#"{"id": "x", "version": "1.0.0"}"#);
        let installer = installer(dir.path(), Arc::new(RecordingHost::default()));

        let removed = installer.remove("x").await.unwrap();
        assert_eq!(removed.id, "x");
        assert!(!dir.path().join("x").exists());

        let err = installer.remove("x").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PkgError>(),
            Some(PkgError::NotInstalled(_))
        ));
    }

    #[test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
    async fn test_concurrent_installs_of_one_id_download_once() {
        let dir = tempdir().unwrap();
        let repo = Arc::new(
            InMemoryRepository::new()
                .with(&[("info.json", r#"{"id": "x", "version": "1.0.0"}"#)]),
        );
        let installer = installer(dir.path(), Arc::new(RecordingHost::default()));

        let handles: Vec<_> = (0..4)
            .map(|_| installer.spawn_install(repo.clone(), "x".into(), VersionSpec::any(), false))
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(repo.downloads(), 1);

        installer.spawn_remove("x".into()).await.unwrap().unwrap();
        assert!(installer.registry().by_name("x").unwrap().is_none());
    }
}
