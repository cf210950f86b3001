use anyhow::{Result, bail};
use log::{debug, error};
use std::path::PathBuf;

use super::config::Config;
use super::request::PackageRequest;
use crate::error::PkgError;
use crate::repository::{RepoHandle, find_package};
use crate::runtime::Runtime;

/// Install one or more packages concurrently.
///
/// Without `repo`, each package comes from the first configured repository
/// that knows it.
#[tracing::instrument(skip(runtime, home))]
pub async fn install<R: Runtime + 'static>(
    runtime: R,
    home: Option<PathBuf>,
    specs: &[String],
    repo: Option<&str>,
    upgrade: bool,
    remove_on_fail: bool,
) -> Result<()> {
    let config = Config::load(runtime, home)?;
    let requests = specs
        .iter()
        .map(|s| s.parse::<PackageRequest>())
        .collect::<Result<Vec<_>>>()?;

    let repos = match repo {
        Some(base) => vec![config.repository(base)?],
        None => config.repositories()?,
    };
    let installer = config.installer(remove_on_fail)?;

    let mut handles = Vec::new();
    for request in requests {
        let source = match locate(&repos, repo.is_some(), &request.name).await {
            Ok(source) => source,
            Err(e) => {
                error!("{:#}", e);
                handles.push((request.name, None));
                continue;
            }
        };
        debug!("Installing {} from {}", request.name, source.base());
        let handle = installer.spawn_install(source, request.name.clone(), request.spec, upgrade);
        handles.push((request.name, Some(handle)));
    }

    let mut failed = Vec::new();
    for (name, handle) in handles {
        let Some(handle) = handle else {
            failed.push(name);
            continue;
        };
        match handle.await? {
            Ok(report) => println!("Installed {}", report),
            Err(e) => {
                error!("Failed to install {}: {:#}", name, e);
                failed.push(name);
            }
        }
    }

    if !failed.is_empty() {
        bail!("Failed to install {}", failed.join(", "));
    }
    Ok(())
}

/// An explicit repository is used as is; otherwise the configured ones are
/// searched in order.
async fn locate(repos: &[RepoHandle], explicit: bool, name: &str) -> Result<RepoHandle> {
    if explicit && let Some(repo) = repos.first() {
        return Ok(repo.clone());
    }
    match find_package(repos, name).await {
        Some(package) => Ok(package.repo),
        None => Err(PkgError::NotFound {
            name: name.to_string(),
            repo: repos
                .iter()
                .map(|r| r.base())
                .collect::<Vec<_>>()
                .join(", "),
        }
        .into()),
    }
}

/// Upgrade an installed package to the newest release.
#[tracing::instrument(skip(runtime, home))]
pub async fn upgrade<R: Runtime + 'static>(
    runtime: R,
    home: Option<PathBuf>,
    name: &str,
) -> Result<()> {
    let config = Config::load(runtime, home)?;
    let repos = config.repositories()?;
    let report = config.installer(false)?.upgrade(&repos, name).await?;
    println!("Upgraded {}", report);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RealRuntime;
    use crate::test_utils::build_archive;
    use std::fs;
    use tempfile::tempdir;

    fn write_config(home: &std::path::Path, repo: &str) {
        fs::write(
            home.join("config.json"),
            format!(r#"{{"repos": ["{}"]}}"#, repo),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_install_from_configured_repository() {
        let home = tempdir().unwrap();
        let mut server = mockito::Server::new_async().await;
        write_config(home.path(), &server.url());

        let archive = build_archive(&[("info.json", r#"{"id": "x", "version": "1.0.0"}"#)]);
        let _info = server
            .mock("GET", "/info?id=x")
            .with_body(r#"{"success": true, "data": {"id": "x", "version": "1.0.0"}}"#)
            .create_async()
            .await;
        let _releases = server
            .mock("GET", "/releases?name=x")
            .with_body(r#"{"success": true, "data": [{"version": "1.0.0"}]}"#)
            .create_async()
            .await;
        let _download = server
            .mock("GET", "/download?spec=x%3D%3D1.0.0")
            .with_body(archive.to_vec())
            .create_async()
            .await;

        install(
            RealRuntime,
            Some(home.path().to_path_buf()),
            &["x".to_string()],
            None,
            false,
            false,
        )
        .await
        .unwrap();

        assert!(home.path().join("packages/x/info.json").is_file());
    }

    #[tokio::test]
    async fn test_install_unknown_package_fails() {
        let home = tempdir().unwrap();
        let mut server = mockito::Server::new_async().await;
        write_config(home.path(), &server.url());
        let _info = server
            .mock("GET", "/info?id=ghost")
            .with_status(404)
            .create_async()
            .await;

        let result = install(
            RealRuntime,
            Some(home.path().to_path_buf()),
            &["ghost".to_string()],
            None,
            false,
            false,
        )
        .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_invalid_request_is_rejected_before_network() {
        let home = tempdir().unwrap();

        let result = install(
            RealRuntime,
            Some(home.path().to_path_buf()),
            &["../x".to_string()],
            Some("https://127.0.0.1:9"),
            false,
            false,
        )
        .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_upgrade_requires_installed_package() {
        let home = tempdir().unwrap();
        write_config(home.path(), "https://127.0.0.1:9");

        let err = upgrade(RealRuntime, Some(home.path().to_path_buf()), "x")
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PkgError>(),
            Some(PkgError::NotInstalled(_))
        ));
    }
}
