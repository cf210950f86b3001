use anyhow::Result;
use log::warn;
use std::path::PathBuf;

use super::config::Config;
use crate::package::LocalRegistry;
use crate::runtime::Runtime;

/// Register every enabled package with the host and load its modules.
#[tracing::instrument(skip(runtime, home))]
pub fn refresh<R: Runtime + 'static>(runtime: R, home: Option<PathBuf>) -> Result<()> {
    let config = Config::load(runtime, home)?;
    let registry = config.registry()?;

    let loaded = load_enabled(&registry)?;
    println!("Loaded {} package(s)", loaded);
    Ok(())
}

/// Returns how many packages loaded; failures are logged and skipped.
fn load_enabled<R: Runtime>(registry: &LocalRegistry<R>) -> Result<usize> {
    let packages = registry.all(false)?;

    // search paths first, so modules can import any enabled package
    for package in &packages {
        if let Err(e) = package.populate_env(registry) {
            warn!("Failed to prepare {}: {:#}", package.id, e);
        }
    }

    let mut loaded = 0;
    for package in &packages {
        match package.load(registry, true) {
            Ok(()) => loaded += 1,
            Err(e) => warn!("Failed to load {}: {:#}", package.id, e),
        }
    }
    Ok(loaded)
}
