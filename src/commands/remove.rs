use anyhow::Result;
use log::debug;
use std::path::PathBuf;

use super::config::Config;
use crate::runtime::Runtime;

/// Remove an installed package
#[tracing::instrument(skip(runtime, home))]
pub async fn remove<R: Runtime + 'static>(
    runtime: R,
    home: Option<PathBuf>,
    name: &str,
) -> Result<()> {
    let config = Config::load(runtime, home)?;
    let installer = config.installer(false)?;

    let package = installer.spawn_remove(name.to_string()).await??;
    debug!("{} ended up at {:?}", package.id, package.path);

    if package.path.exists() {
        println!(
            "Removed {}-{} (files will be deleted after restart)",
            package.id, package.version
        );
    } else {
        println!("Removed {}-{}", package.id, package.version);
    }
    Ok(())
}
