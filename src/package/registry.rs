use anyhow::{Context, Result, bail};
use log::{debug, info, warn};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{LocalPackage, Manifest, is_valid_package_id};
use crate::config::RegistryConfig;
use crate::host::Host;
use crate::runtime::Runtime;

/// Marker file left in a package directory whose deletion was deferred.
pub const REMOVED_MARKER: &str = ".removed";

/// Installed packages under the packages root.
///
/// A package is installed when `<root>/<id>/info.json` is a valid manifest
/// and the directory does not carry the removed marker.
pub struct LocalRegistry<R: Runtime> {
    runtime: Arc<R>,
    host: Arc<dyn Host>,
    root: PathBuf,
    ignored: HashSet<String>,
}

impl<R: Runtime> LocalRegistry<R> {
    /// Opens the registry, creating the root if needed and purging
    /// directories left behind by deferred removals.
    #[tracing::instrument(skip(runtime, host, ignored))]
    pub fn open(
        runtime: Arc<R>,
        host: Arc<dyn Host>,
        root: PathBuf,
        ignored: impl IntoIterator<Item = String>,
    ) -> Result<Self> {
        runtime
            .create_dir_all(&root)
            .with_context(|| format!("Failed to create packages root {:?}", root))?;

        let registry = Self {
            runtime,
            host,
            root,
            ignored: ignored.into_iter().collect(),
        };
        registry.purge_removed();
        Ok(registry)
    }

    pub fn from_config(runtime: Arc<R>, host: Arc<dyn Host>, config: &RegistryConfig) -> Result<Self> {
        Self::open(
            runtime,
            host,
            config.packages_root().to_path_buf(),
            config.ignored_packages.iter().cloned(),
        )
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn host(&self) -> &dyn Host {
        self.host.as_ref()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_ignored(&self, id: &str) -> bool {
        self.ignored.contains(id)
    }

    /// `<root>/<id>`, after checking that `id` is a safe directory name.
    pub fn package_path(&self, id: &str) -> Result<PathBuf> {
        if !is_valid_package_id(id) {
            bail!("Invalid package id {:?}", id);
        }
        Ok(self.root.join(id))
    }

    /// Deletes directories marked as removed. Failures are logged and the
    /// directory is left for the next run.
    pub fn purge_removed(&self) -> usize {
        let entries = match self.runtime.read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to scan {:?}: {:#}", self.root, e);
                return 0;
            }
        };

        let mut purged = 0;
        for dir in entries {
            if !self.runtime.exists(&dir.join(REMOVED_MARKER)) {
                continue;
            }
            match self.runtime.remove_dir_all(&dir) {
                Ok(()) => {
                    info!("Purged removed package directory {:?}", dir);
                    purged += 1;
                }
                Err(e) => debug!("Still unable to delete {:?}: {:#}", dir, e),
            }
        }
        purged
    }

    /// Looks up an installed package by id.
    #[tracing::instrument(skip(self))]
    pub fn by_name(&self, id: &str) -> Result<Option<LocalPackage>> {
        let path = self.package_path(id)?;
        if !self.runtime.is_dir(&path) {
            return Ok(None);
        }

        let package = self.read_package(&path);
        if let Some(package) = &package
            && package.id != id
        {
            warn!(
                "Skipping {:?}: manifest declares id {:?}",
                path, package.id
            );
            return Ok(None);
        }
        Ok(package)
    }

    /// Installed packages whose ignore-list membership equals `disabled`,
    /// sorted by id.
    #[tracing::instrument(skip(self))]
    pub fn all(&self, disabled: bool) -> Result<Vec<LocalPackage>> {
        if !self.runtime.exists(&self.root) {
            return Ok(Vec::new());
        }

        let mut packages: Vec<LocalPackage> = self
            .runtime
            .read_dir(&self.root)?
            .into_iter()
            .filter(|dir| self.runtime.is_dir(dir))
            .filter_map(|dir| self.read_package(&dir))
            .filter(|package| self.is_ignored(&package.id) == disabled)
            .collect();

        packages.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(packages)
    }

    fn read_package(&self, dir: &Path) -> Option<LocalPackage> {
        if self.runtime.exists(&dir.join(REMOVED_MARKER)) {
            debug!("Ignoring {:?}, removal pending", dir);
            return None;
        }

        match Manifest::load(self.runtime.as_ref(), dir) {
            Ok(manifest) => Some(LocalPackage::new(
                manifest.id,
                manifest.version,
                dir.to_path_buf(),
            )),
            Err(e) => {
                warn!("Skipping {:?}: {:#}", dir, e);
                None
            }
        }
    }
}
