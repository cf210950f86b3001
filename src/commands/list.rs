use anyhow::Result;
use log::debug;
use std::path::PathBuf;

use super::config::Config;
use crate::package::LocalPackage;
use crate::repository::list_all;
use crate::runtime::Runtime;

/// List installed packages, or the disabled ones with `disabled`.
#[tracing::instrument(skip(runtime, home))]
pub fn list<R: Runtime + 'static>(runtime: R, home: Option<PathBuf>, disabled: bool) -> Result<()> {
    let config = Config::load(runtime, home)?;
    let packages = config.registry()?.all(disabled)?;

    if packages.is_empty() {
        if disabled {
            println!("No disabled packages.");
        } else {
            println!("No packages installed.");
        }
        return Ok(());
    }

    debug!("Found {} package(s)", packages.len());
    for line in format_installed(&packages) {
        println!("{}", line);
    }
    Ok(())
}

fn format_installed(packages: &[LocalPackage]) -> Vec<String> {
    packages
        .iter()
        .map(|p| format!("{} {}", p.id, p.version))
        .collect()
}

/// List packages offered by the configured repositories, optionally
/// filtered by a case-insensitive substring of id, name or description.
#[tracing::instrument(skip(runtime, home))]
pub async fn search<R: Runtime + 'static>(
    runtime: R,
    home: Option<PathBuf>,
    query: Option<&str>,
) -> Result<()> {
    let config = Config::load(runtime, home)?;
    let repos = config.repositories()?;

    let mut packages = list_all(&repos).await;
    if let Some(query) = query {
        let query = query.to_lowercase();
        packages.retain(|p| {
            [Some(p.id.as_str()), p.name.as_deref(), p.description.as_deref()]
                .into_iter()
                .flatten()
                .any(|field| field.to_lowercase().contains(&query))
        });
    }
    packages.sort_by(|a, b| a.id.cmp(&b.id));

    if packages.is_empty() {
        println!("No packages found.");
        return Ok(());
    }
    for package in packages {
        match &package.description {
            Some(description) => {
                println!("{} {} - {}", package.id, package.version, description)
            }
            None => println!("{} {}", package.id, package.version),
        }
    }
    Ok(())
}

/// Print configured repositories
pub fn repos<R: Runtime + 'static>(runtime: R, home: Option<PathBuf>) -> Result<()> {
    let config = Config::load(runtime, home)?;
    for repo in &config.settings.repos {
        println!("{}", repo);
    }
    Ok(())
}
