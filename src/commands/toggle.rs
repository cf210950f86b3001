use anyhow::Result;
use log::info;
use std::path::PathBuf;

use super::config::Config;
use crate::error::PkgError;
use crate::runtime::Runtime;

/// Take a package off the ignore list
#[tracing::instrument(skip(runtime, home))]
pub fn enable<R: Runtime + 'static>(runtime: R, home: Option<PathBuf>, name: &str) -> Result<()> {
    let mut config = Config::load(runtime, home)?;
    let Some(package) = config.registry()?.by_name(name)? else {
        return Err(PkgError::NotInstalled(name.to_string()).into());
    };

    if config.settings.enable(name) {
        config.save()?;
        println!("Enabled {}", package.id);
    } else {
        info!("{} is already enabled", name);
    }
    Ok(())
}

/// Put a package on the ignore list
#[tracing::instrument(skip(runtime, home))]
pub fn disable<R: Runtime + 'static>(runtime: R, home: Option<PathBuf>, name: &str) -> Result<()> {
    let mut config = Config::load(runtime, home)?;
    if config.registry()?.by_name(name)?.is_none() {
        return Err(PkgError::NotInstalled(name.to_string()).into());
    }

    if config.settings.disable(name) {
        config.save()?;
        println!("Disabled {}", name);
    } else {
        info!("{} is already disabled", name);
    }
    Ok(())
}
